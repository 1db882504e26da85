//! Behaviour-driven step definitions driving the replay CLI scenarios.

use super::helpers::{GROUP_EVENTS, ReplayWorkspace, UNRESOLVED_EVENT};
use super::*;
use crate::replay::run_replay_with;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;

struct ReplayWorld {
    workspace: ReplayWorkspace,
    include_database: RefCell<bool>,
    cli_args: RefCell<Vec<String>>,
    stdout: RefCell<Vec<u8>>,
    result: RefCell<Option<Result<(), CliError>>>,
}

impl ReplayWorld {
    fn new() -> Self {
        Self {
            workspace: ReplayWorkspace::new(),
            include_database: RefCell::new(true),
            cli_args: RefCell::new(Vec::new()),
            stdout: RefCell::new(Vec::new()),
            result: RefCell::new(None),
        }
    }

    fn build_command_line(&self) -> Vec<String> {
        let mut argv = vec![
            "citylink".to_owned(),
            "replay".to_owned(),
            self.workspace.events().into_string(),
            format!("--{ARG_REPLAY_CAPACITY}"),
            "2".to_owned(),
            format!("--{ARG_REPLAY_WORKERS}"),
            "2".to_owned(),
        ];
        if *self.include_database.borrow() {
            argv.push(format!("--{ARG_REPLAY_DATABASE}"));
            argv.push(self.workspace.database().into_string());
        }
        argv.extend(self.cli_args.borrow().iter().cloned());
        argv
    }

    fn stdout(&self) -> String {
        String::from_utf8(self.stdout.borrow().clone()).expect("stdout utf-8")
    }
}

#[fixture]
fn world() -> ReplayWorld {
    ReplayWorld::new()
}

#[given("an events file with two group members")]
fn events_with_members(#[from(world)] world: &ReplayWorld) {
    world.workspace.write_events(GROUP_EVENTS);
}

#[given("an events file with an unknown group member")]
fn events_with_unknown_member(#[from(world)] world: &ReplayWorld) {
    let mut lines = GROUP_EVENTS.to_vec();
    lines.push(UNRESOLVED_EVENT);
    world.workspace.write_events(&lines);
}

#[given("I ask the command to fail on unresolved references")]
fn fail_on_unresolved(#[from(world)] world: &ReplayWorld) {
    world
        .cli_args
        .borrow_mut()
        .push(format!("--{ARG_REPLAY_FAIL_ON_UNRESOLVED}"));
}

#[given("I omit the database path")]
fn omit_database(#[from(world)] world: &ReplayWorld) {
    *world.include_database.borrow_mut() = false;
}

#[when("I run the replay command")]
fn run_replay_command(#[from(world)] world: &ReplayWorld) {
    let invocation = world.build_command_line();
    let parsed = Cli::try_parse_from(invocation).map_err(CliError::from);
    let outcome = parsed.and_then(|cli| match cli.command {
        Command::Replay(args) => {
            let mut buffer = world.stdout.borrow_mut();
            run_replay_with(args, &mut *buffer)
        }
    });
    world.result.replace(Some(outcome));
}

#[then("the command succeeds and reports a clean run")]
fn succeeds_cleanly(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    let result = borrowed.as_ref().expect("result recorded");
    result.as_ref().expect("expected success");
    let stdout = world.stdout();
    assert!(stdout.contains("resolved: 2"), "unexpected output: {stdout}");
    assert!(stdout.contains("outcome: succeeded\n"), "unexpected output: {stdout}");
}

#[then("the group has {count} member rows")]
fn group_has_rows(#[from(world)] world: &ReplayWorld, count: i64) {
    assert_eq!(
        world
            .workspace
            .count("SELECT COUNT(*) FROM group_to_cityobject WHERE cityobjectgroup_id = 7"),
        count
    );
}

#[then("the command succeeds and reports 1 unresolved group member")]
fn succeeds_with_warning(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    let result = borrowed.as_ref().expect("result recorded");
    result.as_ref().expect("expected success");
    let stdout = world.stdout();
    assert!(
        stdout.contains("unresolved group_member: 1"),
        "unexpected output: {stdout}"
    );
    assert!(
        stdout.contains("outcome: succeeded with warnings (1 unresolved)"),
        "unexpected output: {stdout}"
    );
}

#[then("the command fails because 1 reference is unresolved")]
fn fails_on_unresolved(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::Unresolved { count } => assert_eq!(*count, 1),
        other => panic!("expected Unresolved, found {other:?}"),
    }
}

#[then("the command fails because the database path is missing")]
fn fails_missing_database(#[from(world)] world: &ReplayWorld) {
    let borrowed = world.result.borrow();
    let error = borrowed
        .as_ref()
        .expect("result recorded")
        .as_ref()
        .expect_err("expected error");
    match error {
        CliError::MissingArgument { field, .. } => assert_eq!(*field, ARG_REPLAY_DATABASE),
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

macro_rules! register_replay_scenario {
    ($fn_name:ident, $scenario_title:literal) => {
        #[scenario(path = "tests/features/replay_command.feature", name = $scenario_title)]
        fn $fn_name(#[from(world)] world: ReplayWorld) {
            let _ = world;
        }
    };
}

register_replay_scenario!(replay_happy_path, "replaying registrations and references");
register_replay_scenario!(
    replay_reports_warnings,
    "reporting unresolved references as warnings"
);
register_replay_scenario!(
    replay_fails_on_unresolved,
    "failing on unresolved references when asked"
);
register_replay_scenario!(replay_missing_database, "rejecting a missing database path");
