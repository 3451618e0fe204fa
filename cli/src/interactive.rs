use std::{
    collections::HashMap,
    io::{stdin, stdout, Write},
};

use anyhow::Result;
use bitmask_enum::bitmask;
use core_sim::{
    common::Access,
    policy::ReplacementPolicy,
    sim::{AccessResult, CacheSim},
};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

peg::parser!(grammar command() for str {
    rule number() -> usize
        = n:$(quiet!{['0'..='9']+}) {? n.parse().or(Err("number")) }
        / expected!("number")
    rule event() -> WatchEvent
        = "hit" "s"? { WatchEvent::Hit }
        / "miss" "es"? { WatchEvent::Miss }
        / "evict" ("ion" "s"? / "s")? { WatchEvent::Evict }
    rule events() -> WatchEvent
        = first:event() rest:(__ e:event() { e })* {
            rest.into_iter().fold(first, |acc, e| acc | e)
        }
    rule run_mode() -> RunMode
        = "run" { RunMode::Run }
        / "step" n:(__ v:number() { v })? { RunMode::Step(n.unwrap_or(1)) }
    rule show_kind() -> ShowKind
        = "stat" "s"? { ShowKind::Stat }
        / "config" { ShowKind::Config }
        / "set" __ n:number() { ShowKind::Set(n) }
        / "watch" "es"? { ShowKind::Watches }
    rule static_command() -> StaticCommand
        = "show" __ s:show_kind() { StaticCommand::Show(s) }
        / "watch" __ n:number() ev:(__ "on" __ e:events() { e })? { StaticCommand::Watch(n, ev) }
        / "unwatch" __ n:number() { StaticCommand::Unwatch(n) }
        / "trace" __ "off" { StaticCommand::UpdateWhetherTrace(false) }
        / "trace" (__ "on")? { StaticCommand::UpdateWhetherTrace(true) }
    pub(crate) rule parse_command() -> Command
        = _ s:static_command() _ { Command::Static(s) }
        / _ ("exit" / "quit") _ { Command::Exit }
        / _ d:run_mode()? _ { Command::Dynamic(d) }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

pub(crate) enum Command {
    Dynamic(Option<RunMode>),
    Static(StaticCommand),
    Exit,
}

#[derive(Clone, Copy)]
pub(crate) enum RunMode {
    Run,
    Step(usize),
}

pub(crate) enum StaticCommand {
    Show(ShowKind),
    Watch(usize, Option<WatchEvent>),
    Unwatch(usize),
    UpdateWhetherTrace(bool),
}

pub(crate) enum ShowKind {
    Stat,
    Config,
    Set(usize),
    Watches,
}

#[bitmask(u8)]
pub(crate) enum WatchEvent {
    Hit,
    Miss,
    Evict,
}

fn fmt_events(ev: WatchEvent) -> String {
    let mut parts = Vec::new();
    if ev.contains(WatchEvent::Hit) {
        parts.push("hit");
    }
    if ev.contains(WatchEvent::Miss) {
        parts.push("miss");
    }
    if ev.contains(WatchEvent::Evict) {
        parts.push("evict");
    }
    parts.join("/")
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0 - 20)
}

pub(crate) fn execute_interactive(sim: &mut CacheSim, accesses: &[Access]) -> Result<()> {
    let mut cursor = 0usize;
    let mut watches: HashMap<usize, WatchEvent> = HashMap::new();
    let mut mode = RunMode::Step(1);
    let mut do_trace = true;
    println!(
        "entering interactive. {} trace records pending.",
        accesses.len()
    );
    'interactive: loop {
        match mode {
            RunMode::Run => print!("run "),
            RunMode::Step(n) => print!("step {n} "),
        }
        if do_trace {
            print!("[trace] ");
        }
        print!("> ");
        stdout().flush()?;
        let mut line = String::new();
        if stdin().read_line(&mut line)? == 0 {
            // stdin closed
            break 'interactive;
        }
        let parsed = match command::parse_command(&line) {
            Ok(p) => p,
            Err(e) => {
                println!("parse error: expected {}", e.expected);
                continue;
            }
        };
        match parsed {
            Command::Exit => break 'interactive,
            Command::Static(s) => run_static(s, sim, &mut watches, &mut do_trace),
            Command::Dynamic(d) => {
                if let Some(d) = d {
                    mode = d;
                }
                let limit = match mode {
                    RunMode::Run => usize::MAX,
                    RunMode::Step(n) => n,
                };
                for _ in 0..limit {
                    let Some(&access) = accesses.get(cursor) else {
                        println!("trace exhausted after {cursor} accesses.");
                        break;
                    };
                    let r = sim.access(access);
                    cursor += 1;
                    if do_trace {
                        print_access(cursor, access, &r);
                    }
                    if let Some(&mask) = watches.get(&r.set_index) {
                        if let Some(why) = triggered(mask, &r) {
                            println!("watch on set {}: {why} at record #{cursor}", r.set_index);
                            break;
                        }
                    }
                }
            }
        }
    }
    println!("exiting interactive.");
    Ok(())
}

fn run_static(
    cmd: StaticCommand,
    sim: &CacheSim,
    watches: &mut HashMap<usize, WatchEvent>,
    do_trace: &mut bool,
) {
    match cmd {
        StaticCommand::UpdateWhetherTrace(b) => {
            *do_trace = b;
            println!("trace {}", if b { "enabled" } else { "disabled" });
        }
        StaticCommand::Watch(set, ev) => {
            let num_sets = sim.config().num_sets();
            if set >= num_sets {
                println!("set {set} out of range (cache has {num_sets} sets)");
                return;
            }
            let ev = ev.unwrap_or(WatchEvent::all());
            watches.insert(set, ev);
            println!("watching set {set} on {}", fmt_events(ev));
        }
        StaticCommand::Unwatch(set) => {
            if watches.remove(&set).is_some() {
                println!("no longer watching set {set}");
            } else {
                println!("set {set} was not being watched");
            }
        }
        StaticCommand::Show(ShowKind::Watches) => {
            if watches.is_empty() {
                println!("nothing to watch.");
            } else {
                let mut v: Vec<_> = watches.iter().collect();
                v.sort_by_key(|(set, _)| **set);
                println!("watching these sets:");
                for (set, ev) in v {
                    println!("\tset {set} on {}", fmt_events(*ev));
                }
            }
        }
        StaticCommand::Show(ShowKind::Config) => {
            let config = sim.config();
            println!(
                "{} B cache: {} sets x {} ways x {} B blocks, {}, {}",
                config.cache_size(),
                config.num_sets(),
                config.associativity(),
                config.block_size(),
                config.replacement(),
                config.write_policy(),
            );
        }
        StaticCommand::Show(ShowKind::Stat) => {
            show_stat(sim);
        }
        StaticCommand::Show(ShowKind::Set(set)) => {
            let num_sets = sim.config().num_sets();
            if set >= num_sets {
                println!("set {set} out of range (cache has {num_sets} sets)");
                return;
            }
            for (way, w) in sim.table().set(set).iter().enumerate() {
                if !w.valid {
                    println!("\tway {way}: <empty>");
                    continue;
                }
                let dirty = if w.dirty { ", dirty" } else { "" };
                match sim.config().replacement() {
                    ReplacementPolicy::Lru => {
                        println!("\tway {way}: tag {:#x}{dirty}, recency {}", w.tag, w.recency);
                    }
                    ReplacementPolicy::Fifo => {
                        let stamp = w
                            .installed_at
                            .map(|s| format!("#{s}"))
                            .unwrap_or_else(|| "never".to_string());
                        println!("\tway {way}: tag {:#x}{dirty}, installed {stamp}", w.tag);
                    }
                }
            }
        }
    }
}

#[cfg(feature = "stat")]
fn show_stat(sim: &CacheSim) {
    let width = get_terminal_width().unwrap_or(60) as usize;
    println!("{}", sim.collect_stat().view(width));
}

#[cfg(not(feature = "stat"))]
fn show_stat(sim: &CacheSim) {
    let stats = sim.stats();
    println!(
        "hits {} / misses {} (ratio {:.6}); memory reads {}, writes {}",
        stats.hits,
        stats.misses,
        stats.miss_ratio(),
        stats.memory_reads,
        stats.memory_writes,
    );
}

fn print_access(cursor: usize, access: Access, r: &AccessResult) {
    let outcome = if r.is_hit() { "hit " } else { "miss" };
    print!(
        "#{cursor:010}  {access}\t{outcome} (set {}, way {})",
        r.set_index, r.way
    );
    if let Some(e) = r.evicted {
        print!(
            "\tevicted tag {:#x}{}",
            e.tag,
            if e.wrote_back { " [written back]" } else { "" }
        );
    }
    println!();
}

fn triggered(mask: WatchEvent, r: &AccessResult) -> Option<&'static str> {
    if mask.contains(WatchEvent::Evict) && r.evicted.is_some() {
        return Some("eviction");
    }
    if mask.contains(WatchEvent::Hit) && r.is_hit() {
        return Some("hit");
    }
    if mask.contains(WatchEvent::Miss) && !r.is_hit() {
        return Some("miss");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_modes() {
        assert!(matches!(
            command::parse_command("run"),
            Ok(Command::Dynamic(Some(RunMode::Run)))
        ));
        assert!(matches!(
            command::parse_command("step 12"),
            Ok(Command::Dynamic(Some(RunMode::Step(12))))
        ));
        assert!(matches!(
            command::parse_command("step"),
            Ok(Command::Dynamic(Some(RunMode::Step(1))))
        ));
        // an empty line repeats the previous mode
        assert!(matches!(
            command::parse_command("\n"),
            Ok(Command::Dynamic(None))
        ));
    }

    #[test]
    fn test_parse_watch_events() {
        let Ok(Command::Static(StaticCommand::Watch(3, Some(ev)))) =
            command::parse_command("watch 3 on hits evictions")
        else {
            panic!("expected watch command");
        };
        assert!(ev.contains(WatchEvent::Hit));
        assert!(ev.contains(WatchEvent::Evict));
        assert!(!ev.contains(WatchEvent::Miss));
        assert!(matches!(
            command::parse_command("watch 7"),
            Ok(Command::Static(StaticCommand::Watch(7, None)))
        ));
    }

    #[test]
    fn test_parse_show_and_exit() {
        assert!(matches!(
            command::parse_command(" show set 4 "),
            Ok(Command::Static(StaticCommand::Show(ShowKind::Set(4))))
        ));
        assert!(matches!(
            command::parse_command("show stats"),
            Ok(Command::Static(StaticCommand::Show(ShowKind::Stat)))
        ));
        assert!(matches!(command::parse_command("quit"), Ok(Command::Exit)));
        assert!(command::parse_command("frobnicate").is_err());
    }
}
