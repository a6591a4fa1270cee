//! nuXmv trace dialect
//!
//! nuXmv prints traces as textual state dumps separated by `->` markers.
//! The first state is the initialization; every following pair of states
//! advances one system step. Store cells use lowercase array names
//! (`i[a][k]`, `lstig[a][k]`, `e[k]`).

use regex::Regex;

use swarm_spec::Info;

use super::{Event, StoreTag};

/// Translate a nuXmv `show_traces` dump into neutral events.
pub fn translate_nuxmv(output: &str, _info: &Info) -> Result<Vec<Event>, String> {
    let attr = Regex::new(r"^i\[(\d+)l?\]\[(\d+)l?\]$").expect("attr regex");
    let lstig = Regex::new(r"^lstig\[(\d+)l?\]\[(\d+)l?\]$").expect("lstig regex");
    let env = Regex::new(r"^e\[(\d+)l?\]$").expect("env regex");

    // Splitting on the `->` markers yields the preamble followed by one
    // chunk per state.
    let chunks: Vec<&str> = output.split("->").collect();
    if chunks.len() < 2 {
        return Err("No states in the nuXmv output".to_string());
    }

    let mut events: Vec<Event> = Vec::new();
    let mut agent: Option<usize> = None;

    for (i, chunk) in chunks[1..].iter().enumerate() {
        let Some(assigns) = chunk.split("<-").nth(1) else {
            continue;
        };
        if i % 2 == 1 {
            events.push(Event::Step { k: (i / 2) as u64 });
        }
        for raw in assigns.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let Some((lhs, rhs)) = line.split_once('=') else {
                continue;
            };
            let (lhs, rhs) = (lhs.trim(), rhs.trim());
            if lhs == "tid" {
                agent = rhs.parse().ok();
                continue;
            }
            let decoded = if let Some(c) = attr.captures(lhs) {
                Some((StoreTag::I, c[1].parse().ok(), c[2].parse().ok()))
            } else if let Some(c) = lstig.captures(lhs) {
                Some((StoreTag::L, c[1].parse().ok(), c[2].parse().ok()))
            } else if let Some(c) = env.captures(lhs) {
                Some((StoreTag::E, None, c[1].parse().ok()))
            } else {
                None
            };
            let Some((store, cell_agent, Some(index))) = decoded else {
                continue;
            };
            if i == 0 {
                events.push(Event::InitAssign {
                    store,
                    agent: cell_agent,
                    index,
                    value: rhs.to_string(),
                });
            } else {
                events.push(Event::Assign {
                    store,
                    agent: cell_agent.or(agent),
                    index,
                    value: rhs.to_string(),
                    sender: None,
                });
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cex::{render_events, steps_monotone};
    use swarm_spec::Info;

    fn info() -> Info {
        Info::parse(
            "agent Worker 0,2\niface 0=x=0..2\nenvironment 0=token=0..4\n",
            &[],
        )
        .unwrap()
    }

    const TRACE: &str = "\
Trace Description: MSAT Simulation Trace
Trace Type: Simulation
-> State: 1.1 <-
  i[0][0] = 1
  i[1][0] = 2
  e[0] = 3
-> State: 1.2 <-
  tid = 0
  i[0][0] = 0
-> State: 1.3 <-
  e[0] = 1
";

    #[test]
    fn test_translate_states() {
        let info = info();
        let events = translate_nuxmv(TRACE, &info).unwrap();
        assert!(steps_monotone(&events));
        let rendered = render_events(&events, &info);
        assert!(rendered.contains("<initialization>"));
        assert!(rendered.contains("Worker 0:\tx <- 1"));
        assert!(rendered.contains("Worker 1:\tx <- 2"));
        assert!(rendered.contains("token <-- 3"));
        assert!(rendered.contains("<step 0>"));
        assert!(rendered.contains("Worker 0:\tx <- 0"));
    }

    #[test]
    fn test_env_assignment_uses_tracked_agent() {
        let info = info();
        let events = translate_nuxmv(TRACE, &info).unwrap();
        assert!(events.contains(&Event::Assign {
            store: StoreTag::E,
            agent: Some(0),
            index: 0,
            value: "1".to_string(),
            sender: None,
        }));
    }

    #[test]
    fn test_empty_output_errors() {
        let info = info();
        assert!(translate_nuxmv("nothing here", &info).is_err());
    }
}
