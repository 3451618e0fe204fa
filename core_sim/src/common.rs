use std::fmt;

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// to unify displaying byte addresses from the trace
pub struct Addr(u64);

impl Addr {
    pub fn new(v: u64) -> Self {
        Self(v)
    }
    pub fn inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Addr({:#x})", self.0)
    }
}

/// One decoded trace record: what the access does and where it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub kind: AccessKind,
    pub addr: Addr,
}

impl Access {
    pub fn read(addr: u64) -> Self {
        Self {
            kind: AccessKind::Read,
            addr: Addr::new(addr),
        }
    }
    pub fn write(addr: u64) -> Self {
        Self {
            kind: AccessKind::Write,
            addr: Addr::new(addr),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// Returns `true` if the access kind is [`Write`].
    ///
    /// [`Write`]: AccessKind::Write
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => f.write_str("R"),
            AccessKind::Write => f.write_str("W"),
        }
    }
}
