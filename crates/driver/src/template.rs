//! Template model of the emitted program
//!
//! The encoder leaves named holes delimited by comment pairs
//! (`// ___name___` / `// ___end name___`) plus a handful of single
//! markers. This module fills and blanks holes by name and owns the
//! pick-declaration scanning and the step-indexed pick rewrite, so no
//! other component touches the program text directly.

use regex::Regex;

use crate::errors::{DriverError, DriverResult};

pub const HOLE_CONCRETE_GLOBALS: &str = "concrete-globals";
pub const HOLE_CONCRETE_INIT: &str = "concrete-init";
pub const HOLE_CONCRETE_SCHEDULER: &str = "concrete-scheduler";
pub const HOLE_SYMBOLIC_SCHEDULER: &str = "symbolic-scheduler";
pub const HOLE_SYMBOLIC_PICK: &str = "symbolic-pick";
pub const HOLE_SYMBOLIC_INIT: &str = "symbolic-init";
pub const HOLE_INVARIANTS: &str = "invariants";
pub const HOLE_PROPERTY_GLOBALS: &str = "property-globals";
pub const HOLE_PROPERTY_STEP: &str = "property-step";
pub const HOLE_PROPERTY_FINAL: &str = "property-final";

pub const MARKER_INCLUDES: &str = "___includes___";

/// A pick declaration found in the program text:
/// `TYPEOFVALUES <name>[...]; /* Pick <size> <type?> where <cond?> */`
#[derive(Debug, Clone, PartialEq)]
pub struct PickUse {
    pub name: String,
    pub size: usize,
    pub kind: Option<String>,
    pub where_clause: Option<String>,
}

/// The emitted program with its named holes.
#[derive(Debug, Clone)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Template {
        Template { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn start_marker(hole: &str) -> String {
        format!("// ___{}___", hole)
    }

    fn end_marker(hole: &str) -> String {
        format!("// ___end {}___", hole)
    }

    pub fn has_hole(&self, hole: &str) -> bool {
        self.text.contains(&Template::start_marker(hole))
            && self.text.contains(&Template::end_marker(hole))
    }

    /// Replace the content of a named hole, keeping the markers.
    pub fn fill(&mut self, hole: &str, content: &str) -> DriverResult<()> {
        let start_marker = Template::start_marker(hole);
        let end_marker = Template::end_marker(hole);
        let start = self.text.find(&start_marker).ok_or_else(|| {
            DriverError::backend(format!("Emitted program has no '{}' hole", hole))
        })?;
        let content_from = start + start_marker.len();
        let end = self.text[content_from..]
            .find(&end_marker)
            .map(|off| content_from + off)
            .ok_or_else(|| {
                DriverError::backend(format!("Hole '{}' is not terminated", hole))
            })?;
        self.text
            .replace_range(content_from..end, &format!("\n{}\n", content));
        Ok(())
    }

    /// Empty out a named hole.
    pub fn blank(&mut self, hole: &str) -> DriverResult<()> {
        self.fill(hole, "")
    }

    /// Replace every occurrence of a single marker.
    pub fn replace_marker(&mut self, marker: &str, content: &str) {
        self.text = self.text.replace(marker, content);
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    /// Scan pick declarations from the program text.
    pub fn scan_picks(&self) -> Vec<PickUse> {
        let re = Regex::new(
            r"TYPEOFVALUES ([^\[\n]+)\[.+\]; /\* Pick ([0-9]+)\s*(\S*)?\s*(where [^*]+)?\*/",
        )
        .expect("pick regex");
        re.captures_iter(&self.text)
            .filter_map(|cap| {
                let size = cap.get(2)?.as_str().parse().ok()?;
                Some(PickUse {
                    name: cap.get(1)?.as_str().trim().to_string(),
                    size,
                    kind: cap
                        .get(3)
                        .map(|m| m.as_str().trim().to_string())
                        .filter(|s| !s.is_empty()),
                    where_clause: cap
                        .get(4)
                        .map(|m| m.as_str().trim_start_matches("where").trim().to_string())
                        .filter(|s| !s.is_empty()),
                })
            })
            .collect()
    }

    /// Rewrite every usage `name[k]` into `name[__LABS_step][k]`, leaving
    /// the declaration itself untouched.
    pub fn rewrite_pick_usages(&mut self, name: &str) {
        let re = Regex::new(&format!(r"(TYPEOFVALUES )?{}\[", regex::escape(name)))
            .expect("pick usage regex");
        self.text = re
            .replace_all(&self.text, |caps: &regex::Captures<'_>| {
                if caps.get(1).is_some() {
                    caps[0].to_string()
                } else {
                    format!("{}[__LABS_step][", name)
                }
            })
            .into_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "\
int I[3][2];
// ___includes___
// ___concrete-globals___
// ___end concrete-globals___
// ___symbolic-scheduler___
scheduled = nondet();
// ___end symbolic-scheduler___
// ___concrete-scheduler___
// ___end concrete-scheduler___
TYPEOFVALUES mate[2]; /* Pick 2 Worker */
TYPEOFVALUES any[1]; /* Pick 1 */
void step(void) { use(mate[0]); use(any[0]); }
";

    #[test]
    fn test_fill_and_blank() {
        let mut t = Template::new(PROGRAM);
        t.fill(HOLE_CONCRETE_GLOBALS, "int sched[4] = { 0, 1, 2, 0 };")
            .unwrap();
        assert!(t.text().contains("int sched[4] = { 0, 1, 2, 0 };"));
        assert!(t.text().contains("// ___concrete-globals___"));
        t.blank(HOLE_SYMBOLIC_SCHEDULER).unwrap();
        assert!(!t.text().contains("scheduled = nondet();"));
    }

    #[test]
    fn test_fill_missing_hole_fails() {
        let mut t = Template::new(PROGRAM);
        assert!(t.fill(HOLE_SYMBOLIC_INIT, "x").is_err());
    }

    #[test]
    fn test_scan_picks() {
        let t = Template::new(PROGRAM);
        let picks = t.scan_picks();
        assert_eq!(picks.len(), 2);
        assert_eq!(picks[0].name, "mate");
        assert_eq!(picks[0].size, 2);
        assert_eq!(picks[0].kind.as_deref(), Some("Worker"));
        assert_eq!(picks[1].name, "any");
        assert_eq!(picks[1].kind, None);
    }

    #[test]
    fn test_pick_where_clause() {
        let t = Template::new("TYPEOFVALUES m[2]; /* Pick 2 Worker where x > 0 */\n");
        let picks = t.scan_picks();
        assert_eq!(picks[0].where_clause.as_deref(), Some("x > 0"));
    }

    #[test]
    fn test_rewrite_pick_usages_keeps_declaration() {
        let mut t = Template::new(PROGRAM);
        t.rewrite_pick_usages("mate");
        assert!(t.text().contains("TYPEOFVALUES mate[2];"));
        assert!(t.text().contains("use(mate[__LABS_step][0]);"));
        assert!(t.text().contains("use(any[0]);"));
    }

    #[test]
    fn test_replace_marker() {
        let mut t = Template::new(PROGRAM);
        t.replace_marker(MARKER_INCLUDES, "#include \"extra.h\"");
        assert!(t.text().contains("#include \"extra.h\""));
    }
}
