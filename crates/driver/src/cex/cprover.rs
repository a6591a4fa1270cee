//! CPROVER trace dialects (old and new)
//!
//! Parses the state dumps CBMC-family backends print between
//! `Counterexample:` and `Violated property:`. Both header layouts are
//! accepted (`file F line N function FN` and `file F function FN line N`),
//! so traces from a 5.4-era binary and a current one translate to the
//! same event sequence.

use regex::Regex;

use swarm_spec::{Info, Store};

use super::{Event, Outcome, StigmergyKind, StoreTag};

/// One parsed state block.
#[derive(Debug, Clone, PartialEq)]
pub struct CState {
    pub state: u64,
    pub file: String,
    pub function: String,
    pub line: u64,
    pub lhs: String,
    pub rhs: String,
}

/// Parse the state blocks of a counterexample body. No hidden parser
/// state: the text goes in, a `Vec<CState>` comes out.
pub fn parse_states(body: &str) -> Vec<CState> {
    let header_re = Regex::new(
        r"^State (\d+) file (\S+)(?: function (\S+))? line (\d+)(?: function (\S+))?(?: thread (\d+))?",
    )
    .expect("header regex");
    let assign_re = Regex::new(r"^([^\s=]+)\s?=\s?(.+)$").expect("assignment regex");

    let mut states = Vec::new();
    let mut current: Option<(u64, String, String, u64)> = None;
    let mut skipping = false;

    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("Assumption:") || line.starts_with("(SIMULATION)") {
            skipping = true;
            continue;
        }
        if let Some(cap) = header_re.captures(line) {
            skipping = false;
            let function = cap
                .get(3)
                .or_else(|| cap.get(5))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            current = Some((
                cap[1].parse().unwrap_or(0),
                cap[2].to_string(),
                function,
                cap[4].parse().unwrap_or(0),
            ));
            continue;
        }
        if skipping || line.starts_with('-') {
            continue;
        }
        if let (Some((state, file, function, line_no)), Some(cap)) =
            (current.as_ref(), assign_re.captures(line))
        {
            let mut rhs = cap[2].trim().to_string();
            // Strip the trailing binary rendering: `7 (00000111)`
            if let Some(pos) = rhs.rfind(" (") {
                let tail = &rhs[pos + 2..];
                if tail.ends_with(')')
                    && tail[..tail.len() - 1]
                        .chars()
                        .all(|c| c == '0' || c == '1' || c == ' ')
                {
                    rhs.truncate(pos);
                }
            }
            states.push(CState {
                state: *state,
                file: file.clone(),
                function: function.clone(),
                line: *line_no,
                lhs: cap[1].to_string(),
                rhs,
            });
        }
    }
    states
}

fn decode_cell(lhs: &str) -> Option<(StoreTag, Option<usize>, usize)> {
    let attr = Regex::new(r"^I\[(\d+)l?\]\[(\d+)l?\]$").expect("attr regex");
    let lstig = Regex::new(r"^Lvalue\[(\d+)l?\]\[(\d+)l?\]$").expect("lstig regex");
    let env = Regex::new(r"^E\[(\d+)l?\]$").expect("env regex");
    if let Some(c) = attr.captures(lhs) {
        return Some((StoreTag::I, c[1].parse().ok(), c[2].parse().ok()?));
    }
    if let Some(c) = lstig.captures(lhs) {
        return Some((StoreTag::L, c[1].parse().ok(), c[2].parse().ok()?));
    }
    if let Some(c) = env.captures(lhs) {
        return Some((StoreTag::E, None, c[1].parse().ok()?));
    }
    None
}

fn is_ltstamp(lhs: &str) -> bool {
    lhs.starts_with("Ltstamp[")
}

/// Translate a full CPROVER counterexample into neutral events.
pub fn translate_cprover(output: &str, info: &Info) -> Result<Vec<Event>, String> {
    let cex_start = output
        .find("Counterexample:")
        .map(|p| p + "Counterexample:".len())
        .ok_or_else(|| "No counterexample in the backend output".to_string())?;
    let cex_end = output.rfind("Violated property:").unwrap_or(output.len());
    let states = parse_states(&output[cex_start..cex_end]);
    if states.is_empty() {
        return Err("Counterexample contains no states".to_string());
    }

    let mut events: Vec<Event> = Vec::new();

    // Initialization: explicit `init` assignments...
    for s in states
        .iter()
        .filter(|s| s.function == "init" && !is_ltstamp(&s.lhs))
    {
        if let Some((store, agent, index)) = decode_cell(&s.lhs) {
            events.push(Event::InitAssign {
                store,
                agent,
                index,
                value: s.rhs.clone(),
            });
        }
    }
    // ...plus variables whose declared initializer is the single value 0:
    // the backend prints no assignment for those.
    push_zero_inits(info, &mut events);

    let mut agent: Option<usize> = None;
    let mut open_stigmergy: Option<StigmergyKind> = None;
    let mut last_line: Option<(String, u64)> = None;

    for s in states
        .iter()
        .filter(|s| s.function != "init" && s.function != "__CPROVER_initialize")
    {
        match s.lhs.as_str() {
            "__LABS_step" => {
                if let Some(kind) = open_stigmergy.take() {
                    events.push(Event::StigmergyEnd { kind });
                }
                events.push(Event::Step {
                    k: s.rhs.parse().unwrap_or(0),
                });
            }
            "__sim_spurious" if s.rhs == "TRUE" || s.rhs == "1" => {
                events.push(Event::Spurious);
                break;
            }
            "guessedkey" => {
                let kind = if s.function.contains("confirm") {
                    StigmergyKind::Confirm
                } else {
                    StigmergyKind::Propagate
                };
                let key = s
                    .rhs
                    .parse::<usize>()
                    .ok()
                    .and_then(|k| info.var_at(Store::Lstig, k))
                    .map(|v| v.name.clone())
                    .unwrap_or_else(|| s.rhs.clone());
                events.push(Event::Stigmergy {
                    kind,
                    agent: agent.unwrap_or(0),
                    key,
                });
                open_stigmergy = Some(kind);
            }
            "firstAgent" | "scheduled" => {
                agent = s.rhs.parse().ok();
            }
            "format" if s.rhs.starts_with("\"(SIMULATION)") => {
                events.push(Event::Comment {
                    text: s.rhs.trim_matches('"').to_string(),
                });
            }
            _ => {
                // Repeated assignments on one source line are the
                // backend printing a whole array; keep the first.
                let key = (s.file.clone(), s.line);
                if last_line.as_ref() == Some(&key) {
                    continue;
                }
                last_line = Some(key);
                if is_ltstamp(&s.lhs) {
                    continue;
                }
                if let Some((store, cell_agent, index)) = decode_cell(&s.lhs) {
                    events.push(Event::Assign {
                        store,
                        agent: cell_agent.or(agent),
                        index,
                        value: s.rhs.clone(),
                        sender: None,
                    });
                }
            }
        }
    }

    if let Some(kind) = open_stigmergy.take() {
        events.push(Event::StigmergyEnd { kind });
    }

    if cex_end < output.len() {
        let violation = &output[cex_end + "Violated property:".len()..];
        let description = violation
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .nth(1)
            .unwrap_or("")
            .to_string();
        if description != "__simulation__" {
            events.push(Event::Property {
                outcome: Outcome::Violated {
                    property: Some(description),
                },
            });
        }
    }

    Ok(events)
}

fn push_zero_inits(info: &Info, events: &mut Vec<Event>) {
    for var in &info.env {
        if let Ok(values) = var.values(0) {
            if values.as_singleton() == Some(0) {
                for off in 0..var.size {
                    events.push(Event::InitAssign {
                        store: StoreTag::E,
                        agent: None,
                        index: var.index + off,
                        value: "0".to_string(),
                    });
                }
            }
        }
    }
    for (lo, hi, kind) in info.spawn.entries() {
        for (store, vars) in [(StoreTag::I, &kind.iface), (StoreTag::L, &kind.lstig)] {
            for var in vars {
                for tid in *lo..*hi {
                    let Ok(values) = var.values(tid) else { continue };
                    if values.as_singleton() != Some(0) {
                        continue;
                    }
                    for off in 0..var.size {
                        events.push(Event::InitAssign {
                            store,
                            agent: Some(tid),
                            index: var.index + off,
                            value: "0".to_string(),
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cex::{render_events, steps_monotone};
    use swarm_spec::Info;

    fn info() -> Info {
        Info::parse(
            "agent Worker 0,3\niface 0=x=0..2\nlstig 0=pos=undef\n",
            &[],
        )
        .unwrap()
    }

    const NEW_TRACE: &str = "\
some preamble
Counterexample:

State 1 file out.c function init line 4 thread 0
----------------------------------------------------
  I[1][0]=7 (00000000 00000111)

State 2 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=0 (00000000)

State 3 file out.c function main line 10 thread 0
----------------------------------------------------
  scheduled=1 (00000001)

State 4 file out.c function step line 11 thread 0
----------------------------------------------------
  I[1][0]=7 (00000000 00000111)

State 5 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=1 (00000001)

Violated property:
  file out.c function main line 40 thread 0
  always true
  0 != 0
";

    const OLD_TRACE: &str = "\
Counterexample:

State 1 file out.c line 4 function init thread 0
----------------------------------------------------
  I[1][0]=7 (00000000 00000111)

State 2 file out.c line 9 function main thread 0
----------------------------------------------------
  __LABS_step=0 (00000000)

State 3 file out.c line 10 function main thread 0
----------------------------------------------------
  scheduled=1 (00000001)

State 4 file out.c line 11 function step thread 0
----------------------------------------------------
  I[1][0]=7 (00000000 00000111)

State 5 file out.c line 9 function main thread 0
----------------------------------------------------
  __LABS_step=1 (00000001)

Violated property:
  file out.c line 40 function main thread 0
  always true
  0 != 0
";

    #[test]
    fn test_parse_states_both_header_orders() {
        let new_states = parse_states(
            &NEW_TRACE["some preamble\nCounterexample:".len()..NEW_TRACE.rfind("Violated").unwrap()],
        );
        let old_states = parse_states(
            &OLD_TRACE["Counterexample:".len()..OLD_TRACE.rfind("Violated").unwrap()],
        );
        assert_eq!(new_states.len(), 5);
        assert_eq!(new_states, old_states);
        assert_eq!(new_states[0].function, "init");
        assert_eq!(new_states[0].lhs, "I[1][0]");
        assert_eq!(new_states[0].rhs, "7");
    }

    #[test]
    fn test_translate_step_and_assignment() {
        let info = info();
        let events = translate_cprover(NEW_TRACE, &info).unwrap();
        assert!(steps_monotone(&events));
        let steps: Vec<&Event> = events
            .iter()
            .filter(|e| matches!(e, Event::Step { .. }))
            .collect();
        assert_eq!(steps.len(), 2);

        let rendered = render_events(&events, &info);
        let step0 = rendered.find("<step 0>").unwrap();
        let step1 = rendered.find("<step 1>").unwrap();
        let assign = rendered.find("Worker 1:\tx <- 7\n<step 1>").unwrap();
        assert!(step0 < assign && assign < step1);
        assert!(rendered.contains("<property violated: 'always true'>"));
    }

    #[test]
    fn test_old_and_new_dialects_render_identically() {
        let info = info();
        let new_events = translate_cprover(NEW_TRACE, &info).unwrap();
        let old_events = translate_cprover(OLD_TRACE, &info).unwrap();
        assert_eq!(
            render_events(&new_events, &info),
            render_events(&old_events, &info)
        );
    }

    #[test]
    fn test_spurious_terminates_trace() {
        let info = info();
        let trace = "\
Counterexample:

State 1 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=0 (00000000)

State 2 file out.c function main line 12 thread 0
----------------------------------------------------
  __sim_spurious=TRUE

State 3 file out.c function step line 13 thread 0
----------------------------------------------------
  I[0][0]=2 (00000010)
";
        let events = translate_cprover(trace, &info).unwrap();
        assert!(matches!(events.last(), Some(Event::Spurious)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::Assign { .. })));
    }

    #[test]
    fn test_stigmergy_events() {
        let info = info();
        let trace = "\
Counterexample:

State 1 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=0 (00000000)

State 2 file out.c function main line 10 thread 0
----------------------------------------------------
  firstAgent=2 (00000010)

State 3 file out.c function propagate line 22 thread 0
----------------------------------------------------
  guessedkey=0 (00000000)

State 4 file out.c function propagate line 23 thread 0
----------------------------------------------------
  Lvalue[0][0]=4 (00000100)

State 5 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=1 (00000001)
";
        let events = translate_cprover(trace, &info).unwrap();
        let rendered = render_events(&events, &info);
        assert!(rendered.contains("<Worker 2: propagate 'pos'>"));
        assert!(rendered.contains("Worker 0:\tpos <~ 4"));
        assert!(rendered.contains("<end propagate>"));
    }

    #[test]
    fn test_array_print_collapsing() {
        let info = info();
        let trace = "\
Counterexample:

State 1 file out.c function main line 9 thread 0
----------------------------------------------------
  __LABS_step=0 (00000000)

State 2 file out.c function step line 30 thread 0
----------------------------------------------------
  I[0][0]=1 (00000001)

State 3 file out.c function step line 30 thread 0
----------------------------------------------------
  I[1][0]=1 (00000001)
";
        let events = translate_cprover(trace, &info).unwrap();
        let assigns = events
            .iter()
            .filter(|e| matches!(e, Event::Assign { .. }))
            .count();
        assert_eq!(assigns, 1);
    }
}
