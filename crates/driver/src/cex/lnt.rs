//! LNT (process-algebraic) trace dialect
//!
//! CADP traces are sequences of quoted action labels between
//! `<initial state>` and `<goal state>` (or `<deadlock>`). Each label is
//! decoded with a small grammar: `ENDINIT`, `MONITOR !<bool|str>`, or a
//! gate name followed by `!`-separated arguments. Labels that fit no
//! shape are surfaced verbatim instead of failing the whole trace.

use swarm_spec::Info;

use super::{Event, Outcome, StoreTag};

/// Translate a CADP evaluator/executor trace into neutral events.
pub fn translate_cadp(output: &str, _info: &Info) -> Result<Vec<Event>, String> {
    let lines: Vec<&str> = output.lines().collect();
    let first = lines
        .iter()
        .position(|l| l.contains("<initial state>"))
        .map(|i| i + 1)
        .ok_or_else(|| "No initial state in the backend output".to_string())?;
    let last = lines[first..]
        .iter()
        .position(|l| l.contains("<goal state>") || l.contains("<deadlock>"))
        .map(|i| first + i)
        .ok_or_else(|| "Trace has no goal state or deadlock".to_string())?;
    let deadlocked = lines[last].contains("<deadlock>");

    let mut events: Vec<Event> = Vec::new();
    let mut in_init = true;

    for line in &lines[first..last] {
        let line = line.trim();
        if !line.starts_with('"') {
            continue;
        }
        if line.contains("invisible transition") {
            continue;
        }
        let action = line.trim_matches('"');
        match decode_action(action, in_init) {
            Decoded::EndInit => in_init = false,
            Decoded::Event(e) => events.push(e),
            Decoded::Skip => {}
        }
    }
    if deadlocked && !events.iter().any(|e| {
        matches!(
            e,
            Event::Property {
                outcome: Outcome::Deadlock
            }
        )
    }) {
        events.push(Event::Property {
            outcome: Outcome::Deadlock,
        });
    }
    Ok(events)
}

enum Decoded {
    EndInit,
    Event(Event),
    Skip,
}

fn decode_action(action: &str, in_init: bool) -> Decoded {
    let chunks: Vec<&str> = action.split('!').map(|c| c.trim()).collect();
    let head = chunks.first().copied().unwrap_or("");

    match head {
        "ENDINIT" => Decoded::EndInit,
        "MONITOR" => {
            let arg = chunks.get(1).copied().unwrap_or("").trim_matches('"');
            let outcome = match arg {
                "TRUE" => Outcome::Satisfied,
                "FALSE" => Outcome::Violated { property: None },
                "deadlock" => Outcome::Deadlock,
                _ => {
                    return Decoded::Event(Event::Unparsed {
                        text: action.to_string(),
                    })
                }
            };
            Decoded::Event(Event::Property { outcome })
        }
        "E" | "ATTR" | "L" => {
            let store = match head {
                "E" => StoreTag::E,
                "ATTR" => StoreTag::I,
                _ => StoreTag::L,
            };
            let (Some(agent), Some(index), Some(value)) = (
                chunks.get(1).and_then(|c| c.parse::<usize>().ok()),
                chunks.get(2).and_then(|c| c.parse::<usize>().ok()),
                chunks.get(3),
            ) else {
                return Decoded::Event(Event::Unparsed {
                    text: action.to_string(),
                });
            };
            // A fifth argument names the agent that sent this
            // stigmergic message.
            let sender = if store == StoreTag::L {
                chunks.get(4).and_then(|c| c.parse::<usize>().ok())
            } else {
                None
            };
            let event = if in_init {
                Event::InitAssign {
                    store,
                    agent: Some(agent),
                    index,
                    value: value.to_string(),
                }
            } else {
                Event::Assign {
                    store,
                    agent: Some(agent),
                    index,
                    value: value.to_string(),
                    sender,
                }
            };
            Decoded::Event(event)
        }
        _ if head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty() => Decoded::Skip,
        _ => Decoded::Event(Event::Unparsed {
            text: action.to_string(),
        }),
    }
}
