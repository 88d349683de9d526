use swarm_simulator::logging::*;
use swarm_simulator::tests::common::*;

use std::path::Path;

#[test]
fn cli_line_topology() {
    let data = setup("line_topology", false);
    let program = env!("CARGO_BIN_EXE_swarm_cli");

    println!(
        "Running command: {} -s {} -d {}",
        program, &data.test_file, &data.work_dir
    );

    //Assert the scenario finished succesfully
    assert_cli::Assert::command(&[program])
        .with_args(&["-s", &data.test_file, "-d", &data.work_dir])
        .succeeds()
        .and()
        .stdout()
        .contains("node 5:")
        .unwrap();

    let log_file = Path::new(&data.work_dir)
        .join(LOG_DIR_NAME)
        .join(DEFAULT_SCENARIO_LOG);
    let records = get_log_records_from_file(&log_file).expect("Could not read scenario log");

    //The route discovery completed at the originator
    let established = records.iter().find(|r| {
        r.msg == "Received message"
            && r.node.as_deref() == Some("1")
            && r.msg_type.as_deref() == Some("RREP")
            && r.status.as_deref() == Some("ACCEPTED")
    });
    assert!(established.is_some());

    //The data reached node 5 exactly once
    let accepted: Vec<&LogEntry> = records
        .iter()
        .filter(|r| {
            r.msg == "Received message"
                && r.node.as_deref() == Some("5")
                && r.msg_type.as_deref() == Some("DATA")
                && r.status.as_deref() == Some("ACCEPTED")
        })
        .collect();
    assert_eq!(accepted.len(), 1);
    assert!(find_record_by_msg("Scenario finished", &records).is_some());

    //Test passed. Results are not needed.
    teardown(data, true);
}

#[test]
fn cli_missing_scenario_fails() {
    let data = setup("missing_scenario", false);
    let program = env!("CARGO_BIN_EXE_swarm_cli");

    assert_cli::Assert::command(&[program])
        .with_args(&["-s", "/nonexistent/scenario.toml", "-d", &data.work_dir])
        .fails_with(2)
        .unwrap();

    teardown(data, true);
}
