//! Cross-module analysis scenarios: parsed systems through the full
//! chaos fixpoint, on both domains.

use swarm_analysis::{value_analysis, AbstractDomain, Sign, Stripes, DEFAULT_BOUND};
use swarm_spec::Info;

fn parse(bundle: &str) -> Info {
    Info::parse(bundle, &[]).expect("bundle parses")
}

#[test]
fn toggle_system_converges_on_both_domains() {
    let info = parse(
        "agent A 0,3\n\
         iface 0=x=0..1\n\
         process A Behavior = x <- 1 - x; Behavior\n",
    );
    let stripes = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    assert!(stripes.fixpoint);
    let x = stripes.state.get("x").unwrap();
    assert!(x.contains(0) && x.contains(1));
    assert!(!x.contains(2));

    let signs = value_analysis::<Sign>(&info, 10).unwrap();
    let x = signs.state.get("x").unwrap();
    assert!(x.contains(0) && x.contains(1));
}

#[test]
fn choice_between_growth_and_reset() {
    let info = parse(
        "agent A 0,2\n\
         iface 0=x=0\n\
         process A Behavior = (x < 3 -> x <- x + 1 ++ x <- 0); Behavior\n",
    );
    let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    let x = va.state.get("x").unwrap();
    for v in 0..=3 {
        assert!(x.contains(v), "expected {} in {}", v, x);
    }
    assert!(!x.contains(4));
}

#[test]
fn nondeterministic_range_assignment() {
    let info = parse(
        "agent A 0,2\n\
         iface 0=x=0\n\
         process A Behavior = x <- 0 .. 5; Behavior\n",
    );
    let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    assert!(va.fixpoint);
    let x = va.state.get("x").unwrap();
    assert!(x.contains(4));
    assert!(!x.contains(5));
}

#[test]
fn environment_and_stigmergy_participate() {
    let info = parse(
        "agent A 0,2\n\
         iface 0=x=0..2\n\
         lstig 0=pos=0..4\n\
         environment 0=token=[0,1]\n\
         process A Behavior = pos <~ pos + x; token <-- 1 - token; Behavior\n",
    );
    let va = value_analysis::<Stripes>(&info, 5).unwrap();
    assert!(va.state.get("pos").is_some());
    let token = va.state.get("token").unwrap();
    assert!(token.contains(0) && token.contains(1));
    let deps = va.depends.get("pos").unwrap();
    assert!(deps.contains("x"));
    assert!(deps.contains("pos"));
}

#[test]
fn call_through_shared_process_definitions() {
    let info = parse(
        "agent A 0,2\n\
         iface 0=x=0..2\n\
         process A Behavior = Work; Behavior\n\
         process system Work = x <- 2\n",
    );
    let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    assert!(va.fixpoint);
    assert!(va.state.get("x").unwrap().contains(2));
}

#[test]
fn guard_refinement_beats_plain_join() {
    // Without bisection, x < 10 on a wide range cannot decide; the
    // refined application must still bound the post-state soundly.
    let info = parse(
        "agent A 0,1\n\
         iface 0=x=0..20\n\
         process A Behavior = x < 10 -> x <- x + 1; Behavior\n",
    );
    let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    let x = va.state.get("x").unwrap();
    // Initial envelope plus guarded increments: never beyond 10
    assert!(x.contains(19));
    assert!(x.contains(10));
    assert!(!x.contains(21));
}

#[test]
fn certificates_respect_dependencies() {
    // y copies x, x diverges: neither may be certified; z is untouched
    // by them and stays put.
    let info = parse(
        "agent A 0,1\n\
         iface 0=x=0; 1=y=0; 2=z=5..7\n\
         process A Behavior = x <- x + 1; y <- x; z <- z; Behavior\n",
    );
    let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
    assert!(!va.fixpoint);
    assert!(!va.wont_change.contains("x"));
    assert!(!va.wont_change.contains("y"));
    assert!(va.wont_change.contains("z"));
    assert!(va.wont_change.contains("id"));
}

#[test]
fn domains_agree_on_truth_constants() {
    fn check<D: AbstractDomain>() {
        assert_eq!(D::yes().and_(&D::yes()), D::yes());
        assert_eq!(D::no().or_(&D::no()), D::no());
        assert_eq!(D::maybe().and_(&D::no()), D::no());
    }
    check::<Stripes>();
    check::<Sign>();
}
