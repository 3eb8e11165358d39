use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::{sleep, Instant};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use umeme::{
    ConfigUpdate, EventReceiver, Executor, ExecutorConfig, ExecutorEvent, OutputKind,
    PreprocessError, ProgramState, RuntimeError,
};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn executor() -> Executor {
    Executor::new(ExecutorConfig {
        timestamps: false,
        ..Default::default()
    })
}

fn component_changes(rx: &mut EventReceiver) -> Vec<(usize, bool)> {
    rx.drain()
        .into_iter()
        .filter_map(|event| match event {
            ExecutorEvent::ComponentChanged { index, is_enabled } => Some((index, is_enabled)),
            _ => None,
        })
        .collect()
}

/// Changes made by the program itself, after the board reset that opens
/// every run.
fn run_changes(rx: &mut EventReceiver) -> Vec<(usize, bool)> {
    let mut changes = component_changes(rx);
    let rest = changes.split_off(changes.len().min(20));
    let reset: Vec<(usize, bool)> = (0..20).map(|index| (index, false)).collect();
    assert_eq!(changes, reset);
    rest
}

fn messages(events: &[ExecutorEvent], kind: OutputKind) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event.as_output())
        .filter(|output| output.kind == kind)
        .map(|output| output.message.clone())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_blink_program() {
    let executor = executor();
    let mut rx = executor.subscribe();
    let started = Instant::now();

    let log = executor.run("washa(1)\nsubiri(100)\nzima(1)").await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(
        log.lines().collect::<Vec<_>>(),
        vec![
            "ℹ️ 🚀 Kuanzisha utekelezaji wa programu...",
            "ℹ️ Inatekeleza: washa(1)",
            "✅ Kifaa nambari 1 kimewashwa",
            "ℹ️ Inatekeleza: subiri(100)",
            "ℹ️ Inasubiri kwa 100ms...",
            "ℹ️ Muda wa kusubiri umeisha",
            "ℹ️ Inatekeleza: zima(1)",
            "✅ Kifaa nambari 1 kimezimwa",
            "✅ ✨ Programu imekamilika kwa mafanikio!",
        ]
    );
    assert_eq!(run_changes(&mut rx), vec![(0, true), (0, false)]);
    assert_eq!(executor.state(), ProgramState::Idle);
    assert_eq!(executor.current_line().await, None);
    assert!(executor.components().await.iter().all(|c| !c.is_enabled));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_blink_output_order() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor
        .run("rudia(3) { washa(1)\nsubiri(10)\nzima(1)\nsubiri(10) }")
        .await
        .unwrap();

    let outputs: Vec<(OutputKind, String)> = rx
        .drain()
        .iter()
        .filter_map(|event| event.as_output())
        .filter(|output| !output.message.starts_with("Inatekeleza:"))
        .map(|output| (output.kind, output.message.clone()))
        .collect();
    let pass = [
        (OutputKind::Success, "Kifaa nambari 1 kimewashwa"),
        (OutputKind::Info, "Inasubiri kwa 10ms..."),
        (OutputKind::Info, "Muda wa kusubiri umeisha"),
        (OutputKind::Success, "Kifaa nambari 1 kimezimwa"),
        (OutputKind::Info, "Inasubiri kwa 10ms..."),
        (OutputKind::Info, "Muda wa kusubiri umeisha"),
    ];
    let mut expected = vec![(OutputKind::Info, "🚀 Kuanzisha utekelezaji wa programu...")];
    for _ in 0..3 {
        expected.extend(pass.iter().cloned());
    }
    expected.push((OutputKind::Success, "✨ Programu imekamilika kwa mafanikio!"));
    let expected: Vec<(OutputKind, String)> = expected
        .into_iter()
        .map(|(kind, message)| (kind, message.to_string()))
        .collect();

    assert_eq!(outputs, expected);
    assert_eq!(executor.state(), ProgramState::Idle);
    assert!(!executor.components().await[0].is_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_run_starts_with_board_off() {
    let executor = executor();

    executor.run("washa(1)").await.unwrap();
    assert!(executor.components().await[0].is_enabled);

    executor.run("zima(2)").await.unwrap();

    let components = executor.components().await;
    assert!(components.iter().all(|c| !c.is_enabled));
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.run("washa(2)").await.unwrap();

    let states: Vec<ProgramState> = rx
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            ExecutorEvent::StateChanged(state) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![ProgramState::Running, ProgramState::Idle]);
}

#[tokio::test(start_paused = true)]
async fn test_one_line_repeat_block() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.run("rudia(2) { washa(1) }").await.unwrap();

    assert_eq!(run_changes(&mut rx), vec![(0, true), (0, true)]);
}

#[tokio::test(start_paused = true)]
async fn test_nested_repeat_blocks() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor
        .run("rudia(2) {\n  rudia(3) {\n    zima(2)\n  }\n}")
        .await
        .unwrap();

    assert_eq!(run_changes(&mut rx), vec![(1, false); 6]);
}

#[tokio::test(start_paused = true)]
async fn test_assignment_round_trip() {
    let executor = executor();

    executor.run("x = 2\ny = x + 3\nwasha(y)").await.unwrap();

    let components = executor.components().await;
    assert!(components[4].is_enabled);
    assert_eq!(components.iter().filter(|c| c.is_enabled).count(), 1);
    let variables = executor.variables().await;
    assert_eq!(variables.get("x"), Some(2.0));
    assert_eq!(variables.get("y"), Some(5.0));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_command_aborts() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.run("bonk(1)\nwasha(1)").await.unwrap();

    let events = rx.drain();
    assert_eq!(
        messages(&events, OutputKind::Error),
        vec!["Amri haijulikani: bonk(1)"]
    );
    assert!(events.contains(&ExecutorEvent::Error(Some(
        "Amri haijulikani: bonk(1)".to_string()
    ))));
    assert!(messages(&events, OutputKind::Success).is_empty());
    assert_eq!(executor.state(), ProgramState::Idle);
    assert!(!executor.components().await[0].is_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_identifier_aborts() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.run("1x = 5\nwasha(1)").await.unwrap();

    let events = rx.drain();
    assert_eq!(
        messages(&events, OutputKind::Error),
        vec!["Jina la kigezo si sahihi: 1x"]
    );
    assert!(executor.variables().await.is_empty());
    assert_eq!(executor.state(), ProgramState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_pin_aborts() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.run("washa(25)").await.unwrap();

    let log = executor.output_log().await;
    assert!(log.contains(&"❌ Nambari ya kifaa si sahihi: 25".to_string()));
    assert!(run_changes(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let executor = executor();

    executor.stop().await;
    executor.stop().await;

    assert_eq!(executor.state(), ProgramState::Idle);
    assert_eq!(executor.current_line().await, None);
    assert_eq!(
        executor.output_log().await,
        vec![
            "ℹ️ ⏹️ Utekelezaji wa programu umesimamishwa",
            "ℹ️ ⏹️ Utekelezaji wa programu umesimamishwa",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_wait() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor
        .start("washa(1)\nsubiri(10000)\nzima(1)")
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(executor.state(), ProgramState::Running);
    assert_eq!(executor.current_line().await, Some(1));

    executor.stop().await;
    sleep(Duration::from_secs(20)).await;

    assert_eq!(executor.state(), ProgramState::Idle);
    assert_eq!(executor.current_line().await, None);
    assert!(executor.components().await[0].is_enabled);
    let infos = messages(&rx.drain(), OutputKind::Info);
    assert!(!infos.iter().any(|m| m == "Muda wa kusubiri umeisha"));
    assert_eq!(
        infos.last().map(String::as_str),
        Some("⏹️ Utekelezaji wa programu umesimamishwa")
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_ignored() {
    let executor = executor();

    executor.start("subiri(1000)").await.unwrap();
    executor.start("washa(1)").await.unwrap();
    executor.wait_until_idle().await.unwrap();

    assert!(!executor.components().await[0].is_enabled);
    let log = executor.output_log().await;
    assert!(!log.iter().any(|line| line.contains("washa(1)")));
}

#[tokio::test(start_paused = true)]
async fn test_run_while_running_is_rejected() {
    let executor = executor();

    executor.start("subiri(1000)").await.unwrap();
    let result = executor.run("washa(1)").await;

    assert!(matches!(result, Err(RuntimeError::AlreadyRunning)));
    executor.wait_until_idle().await.unwrap();
    assert!(!executor.components().await[0].is_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_looping_program_keeps_variables() {
    let executor = Executor::new(ExecutorConfig {
        loop_program: true,
        timestamps: false,
        ..Default::default()
    });

    executor.start("subiri(20)\nx = 7").await.unwrap();
    sleep(Duration::from_millis(30)).await;

    assert_eq!(executor.state(), ProgramState::Running);
    assert_eq!(executor.current_line().await, Some(0));
    assert_eq!(executor.variables().await.get("x"), Some(7.0));

    executor.stop().await;
    assert_eq!(executor.state(), ProgramState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_loop_can_be_switched_on_while_idle() {
    let executor = executor();
    executor.update_config(ConfigUpdate::loop_program(true)).await;

    executor.start("washa(1)\nsubiri(10)\nzima(1)\nsubiri(10)").await.unwrap();
    sleep(Duration::from_millis(105)).await;
    executor.stop().await;

    let log = executor.output_log().await;
    let passes = log
        .iter()
        .filter(|line| line.ends_with("Kifaa nambari 1 kimewashwa"))
        .count();
    assert!(passes >= 5, "only {} passes", passes);
    assert!(!log.iter().any(|line| line.contains("imekamilika")));
}

#[tokio::test(start_paused = true)]
async fn test_direct_commands() {
    let executor = executor();
    let mut rx = executor.subscribe();

    executor.execute_direct_command("washa(2)").await.unwrap();
    executor.execute_direct_command("   ").await.unwrap();
    let failed = executor.execute_direct_command("bonk").await;

    assert!(matches!(failed, Err(RuntimeError::Dispatch(_))));
    assert_eq!(executor.state(), ProgramState::Idle);
    assert_eq!(executor.current_line().await, None);
    assert!(executor.components().await[1].is_enabled);

    let events = rx.drain();
    assert_eq!(
        messages(&events, OutputKind::Info),
        vec!["> washa(2)", "> bonk"]
    );
    let errors: Vec<Option<String>> = events
        .into_iter()
        .filter_map(|event| match event {
            ExecutorEvent::Error(error) => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        vec![None, Some("Amri haijulikani: bonk".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_direct_wait() {
    let executor = executor();
    let started = Instant::now();

    executor.execute_direct_command("subiri(250)").await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(
        executor.output_log().await.last().map(String::as_str),
        Some("ℹ️ Muda wa kusubiri umeisha")
    );
}

#[tokio::test(start_paused = true)]
async fn test_direct_command_during_run_keeps_state() {
    let executor = executor();

    executor.start("subiri(1000)\nwasha(1)").await.unwrap();
    sleep(Duration::from_millis(10)).await;
    executor.execute_direct_command("washa(3)").await.unwrap();

    assert_eq!(executor.state(), ProgramState::Running);
    assert_eq!(executor.current_line().await, Some(0));

    executor.wait_until_idle().await.unwrap();
    let components = executor.components().await;
    assert!(components[0].is_enabled);
    assert!(components[2].is_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_reset_components() {
    let executor = executor();
    executor.run("washa(1)\nwasha(2)").await.unwrap();
    let mut rx = executor.subscribe();

    executor.reset_components().await;

    assert!(executor.components().await.iter().all(|c| !c.is_enabled));
    let changes = component_changes(&mut rx);
    assert_eq!(changes.len(), 20);
    assert!(changes.iter().all(|(_, is_enabled)| !is_enabled));
}

#[tokio::test(start_paused = true)]
async fn test_preprocess_failure_stays_idle() {
    let executor = executor();
    let mut rx = executor.subscribe();

    let result = executor.start("rudia(2) {\nwasha(1)").await;

    assert!(matches!(
        result,
        Err(RuntimeError::Preprocess(PreprocessError::UnterminatedBlock { line: 1 }))
    ));
    assert_eq!(executor.state(), ProgramState::Idle);
    let events = rx.drain();
    assert!(events
        .iter()
        .any(|event| matches!(event, ExecutorEvent::Error(Some(_)))));
    assert!(events
        .iter()
        .all(|event| !matches!(event, ExecutorEvent::StateChanged(_))));
}

#[tokio::test(start_paused = true)]
async fn test_independent_executors() {
    let first = executor();
    let second = executor();

    first.run("washa(1)").await.unwrap();

    assert!(first.components().await[0].is_enabled);
    assert!(!second.components().await[0].is_enabled);
}
