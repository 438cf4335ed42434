//! Property tests for the navigator driven by random command sequences.

use proptest::prelude::*;
use starmap_core::{
    CenterInfo, Directive, LinkMode, NavAction, NavEvent, Navigator, NavigatorConfig,
    NeighborSet, NoticeLevel,
};
use std::time::Duration;

fn neighbors_of(title: &str) -> NeighborSet {
    NeighborSet::new(
        CenterInfo::titled(title),
        (0..6).map(|i| format!("{title}.{i}")).collect(),
        LinkMode::Outlinks,
    )
}

/// Run a directive chain to completion. Fetches for titles starting with
/// `!` fail.
fn drive(nav: &mut Navigator, mut d: Directive) {
    loop {
        d = match d {
            Directive::Fetch(req) => {
                let result = if req.title.starts_with('!') {
                    Err("unreachable host")
                } else {
                    Ok(neighbors_of(&req.title))
                };
                nav.on_fetched(req.id, result).unwrap()
            }
            Directive::Animate(_) => loop {
                if let Some(next) = nav.tick(Duration::from_millis(250)) {
                    break next;
                }
            },
            Directive::Idle | Directive::Queued => return,
        };
    }
}

#[derive(Debug, Clone)]
enum Cmd {
    Travel(u8, bool),
    Back,
    Forward,
    Jump(u8),
    Trail(bool),
    Fail,
}

fn cmd() -> impl Strategy<Value = Cmd> {
    prop_oneof![
        4 => (0u8..12, any::<bool>()).prop_map(|(n, add)| Cmd::Travel(n, add)),
        2 => Just(Cmd::Back),
        1 => Just(Cmd::Forward),
        2 => (0u8..10).prop_map(Cmd::Jump),
        1 => any::<bool>().prop_map(Cmd::Trail),
        1 => Just(Cmd::Fail),
    ]
}

fn apply(nav: &mut Navigator, cmd: &Cmd) {
    let d = match cmd {
        Cmd::Travel(n, add) => nav.travel_to_neighbor(&format!("P{n}"), *add).ok(),
        Cmd::Back => Some(nav.go_back_one()),
        Cmd::Forward => Some(nav.go_forward_one()),
        Cmd::Jump(i) => nav.jump_to_breadcrumb(*i as usize).ok(),
        Cmd::Trail(on) => {
            nav.set_trail_mode(*on);
            None
        }
        Cmd::Fail => nav.travel_to_neighbor("!down", true).ok(),
    };
    if let Some(d) = d {
        drive(nav, d);
    }
}

fn rooted() -> Navigator {
    let mut nav = Navigator::new(NavigatorConfig::default());
    let d = nav.start_fresh_search("Seed").unwrap();
    drive(&mut nav, d);
    nav
}

proptest! {
    #[test]
    fn history_cursor_stays_in_range(cmds in prop::collection::vec(cmd(), 0..40)) {
        let mut nav = rooted();
        for c in &cmds {
            apply(&mut nav, c);
            let snap = nav.snapshot();
            prop_assert!(!snap.history.is_empty());
            prop_assert!(snap.history_index >= 0);
            prop_assert!((snap.history_index as usize) < snap.history.len());
            prop_assert_eq!(
                snap.current_center.as_deref(),
                Some(snap.history[snap.history_index as usize].as_str())
            );
            prop_assert!(!snap.is_animating);
            prop_assert!(snap.pending_nav.is_none());
            prop_assert!(snap.ghosts.len() <= nav.config().max_ghosts);
        }
    }

    #[test]
    fn visited_only_grows(cmds in prop::collection::vec(cmd(), 1..30)) {
        let mut nav = rooted();
        let mut seen = nav.snapshot().visited;
        for c in &cmds {
            apply(&mut nav, c);
            let now = nav.snapshot().visited;
            prop_assert!(seen.iter().all(|t| now.contains(t)));
            seen = now;
        }
    }

    #[test]
    fn pending_is_overwritten_not_accumulated(extra in prop::collection::vec(0u8..8, 1..6)) {
        let mut nav = rooted();
        let Directive::Fetch(req) = nav.travel_to_neighbor("First", true).unwrap() else {
            panic!("expected fetch");
        };
        for n in &extra {
            let d = nav.travel_to_neighbor(&format!("Q{n}"), true).unwrap();
            prop_assert_eq!(d, Directive::Queued);
            prop_assert_eq!(nav.state().current_center(), Some("Seed"));
        }
        let last = format!("Q{}", extra[extra.len() - 1]);
        prop_assert_eq!(
            nav.state().pending_nav(),
            Some(&NavAction::TravelTo { title: last.clone(), add_to_history: true })
        );

        let d = nav.on_fetched(req.id, Ok::<_, String>(neighbors_of("First"))).unwrap();
        drive(&mut nav, d);

        let snap = nav.snapshot();
        prop_assert_eq!(snap.current_center.as_deref(), Some(last.as_str()));
        prop_assert_eq!(snap.history, vec!["Seed".to_string(), "First".to_string(), last]);
        prop_assert!(snap.pending_nav.is_none());
    }
}

#[test]
fn failure_emits_exactly_one_error_notice() {
    let mut nav = rooted();
    let d = nav.travel_to_neighbor("X", true).unwrap();
    drive(&mut nav, d);
    nav.drain_events();
    let before = nav.snapshot();

    let d = nav.travel_to_neighbor("!Y", true).unwrap();
    drive(&mut nav, d);

    let errors = nav
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, NavEvent::Notice(n) if n.level == NoticeLevel::Error))
        .count();
    assert_eq!(errors, 1);
    assert_eq!(nav.snapshot(), before);
}

#[test]
fn pending_replays_after_aborted_fetch() {
    let mut nav = rooted();
    let Directive::Fetch(req) = nav.travel_to_neighbor("!broken", true).unwrap() else {
        panic!("expected fetch");
    };
    assert_eq!(nav.travel_to_neighbor("Fine", true).unwrap(), Directive::Queued);

    let d = nav.on_fetched(req.id, Err("timeout")).unwrap();
    assert!(matches!(d, Directive::Fetch(ref r) if r.title == "Fine"));
    drive(&mut nav, d);

    let snap = nav.snapshot();
    assert_eq!(snap.history, vec!["Seed".to_string(), "Fine".to_string()]);
}
