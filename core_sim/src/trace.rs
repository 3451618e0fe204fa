use nom::{
    character::complete::{hex_digit1, multispace0, multispace1, one_of},
    combinator::{all_consuming, map, map_res},
    multi::many0,
    sequence::{preceded, separated_pair, terminated},
    IResult,
};
use thiserror::Error;

use crate::common::{Access, AccessKind, Addr};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceError {
    #[error("malformed trace record at line {line} (byte offset {offset})")]
    Malformed { line: usize, offset: usize },
}

fn access_kind(input: &str) -> IResult<&str, AccessKind> {
    map(one_of("RW"), |c| match c {
        'R' => AccessKind::Read,
        _ => AccessKind::Write,
    })(input)
}

/// Bare hex, no `0x` prefix, either digit case.
fn hex_addr(input: &str) -> IResult<&str, Addr> {
    map_res(hex_digit1, |digits| {
        u64::from_str_radix(digits, 16).map(Addr::new)
    })(input)
}

fn record(input: &str) -> IResult<&str, Access> {
    map(
        separated_pair(access_kind, multispace1, hex_addr),
        |(kind, addr)| Access { kind, addr },
    )(input)
}

/// Decodes a whole trace: whitespace-separated `<R|W> <hexaddr>` records.
///
/// The first token that is not part of a well-formed record aborts the parse
/// with its position; nothing after it is handed to the simulator.
pub fn parse_trace(input: &str) -> Result<Vec<Access>, TraceError> {
    let result: IResult<&str, Vec<Access>> = all_consuming(terminated(
        many0(preceded(multispace0, record)),
        multispace0,
    ))(input);
    match result {
        Ok((_, records)) => Ok(records),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let offset = input.len() - e.input.len();
            let line = input[..offset].matches('\n').count() + 1;
            Err(TraceError::Malformed { line, offset })
        }
        // complete-input parsers do not suspend; treat it as truncated input
        Err(nom::Err::Incomplete(_)) => Err(TraceError::Malformed {
            line: input.matches('\n').count() + 1,
            offset: input.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records_in_order() {
        let trace = "R 10324f\nW ff6eb0\nR 10324f\n";
        let records = parse_trace(trace).unwrap();
        assert_eq!(
            records,
            vec![
                Access::read(0x10324f),
                Access::write(0xff6eb0),
                Access::read(0x10324f),
            ]
        );
    }

    #[test]
    fn test_whitespace_is_free_form() {
        // records are token pairs, not lines
        let records = parse_trace("  R 0 W\t40\r\n  R a0 ").unwrap();
        assert_eq!(
            records,
            vec![Access::read(0), Access::write(0x40), Access::read(0xa0)]
        );
    }

    #[test]
    fn test_empty_trace_is_ok() {
        assert_eq!(parse_trace("").unwrap(), vec![]);
        assert_eq!(parse_trace("  \n\t ").unwrap(), vec![]);
    }

    #[test]
    fn test_hex_digit_case_is_accepted() {
        let records = parse_trace("R DEADbeef").unwrap();
        assert_eq!(records, vec![Access::read(0xdead_beef)]);
    }

    #[test]
    fn test_unknown_opcode_aborts_with_position() {
        let err = parse_trace("R 40\nX 80\n").unwrap_err();
        assert_eq!(err, TraceError::Malformed { line: 2, offset: 5 });
    }

    #[test]
    fn test_prefixed_or_truncated_records_abort() {
        assert!(parse_trace("R 0x40").is_err());
        assert!(parse_trace("W").is_err());
        assert!(parse_trace("R 40 W").is_err());
    }
}
