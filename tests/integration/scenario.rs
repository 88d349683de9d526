use swarm_simulator::logging;
use swarm_simulator::node::commands::Commands;
use swarm_simulator::node::NodeStatus;
use swarm_simulator::scenario::{Scenario, ScenarioSpec};
use swarm_simulator::tests::common::*;

use std::thread;
use std::time::Duration;

const THREE_NODES: &str = r#"
name = "three_nodes"
duration = 1000

[default_protocol]
hello_interval = 100
maintenance_interval = 200

[[nodes]]
id = "1"
transmission_range = 120.0
[nodes.position]
x = 0.0
y = 0.0

[[nodes]]
id = "2"
transmission_range = 120.0
[nodes.position]
x = 100.0
y = 0.0

[[nodes]]
id = "3"
transmission_range = 120.0
[nodes.position]
x = 200.0
y = 0.0
[nodes.velocity]
x = 0.0
y = 50.0
"#;

#[test]
fn threaded_delivery_and_shutdown() {
    let data = setup("threaded_delivery", false);
    let spec = ScenarioSpec::from_toml(THREE_NODES).expect("Could not parse scenario");
    let scenario = Scenario::start(&spec, data.logger.clone()).expect("Could not start scenario");

    let node_1 = scenario.node("1").expect("Node 1 is not running");
    assert_eq!(node_1.status(), NodeStatus::Running);
    node_1
        .send_command(Commands::Data(String::from("3"), b"position report".to_vec()))
        .expect("Could not send command");

    thread::sleep(Duration::from_millis(600));
    let routes = scenario.node("1").map(|n| n.routes()).unwrap_or_default();
    let to_3 = routes
        .iter()
        .find(|r| r.destination == "3")
        .expect("Node 1 has no route to 3");
    assert_eq!(to_3.next_hop, "2");

    //Node 3 moves north, staying within range of node 2
    let pos = scenario
        .medium()
        .position_of("3")
        .expect("Node 3 is not registered");
    assert!(pos.y > 0.0);
    assert_eq!(pos.x, 200.0);

    let reports = scenario.stop().expect("Scenario did not stop cleanly");
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.status == NodeStatus::Stopped));

    let report_3 = reports.iter().find(|r| r.id == "3").expect("No report for node 3");
    assert_eq!(report_3.delivered_data.len(), 1);
    assert_eq!(report_3.delivered_data[0].data, b"position report".to_vec());
    assert_eq!(report_3.pending, 0);

    let report_2 = reports.iter().find(|r| r.id == "2").expect("No report for node 2");
    assert!(report_2.delivered_data.is_empty());
    assert!(report_2
        .data_cache
        .contains(&report_3.delivered_data[0].checksum));

    teardown(data, true);
}

#[test]
fn scenario_stops_every_node() {
    let spec = ScenarioSpec::from_toml(THREE_NODES).expect("Could not parse scenario");
    let scenario = Scenario::start(&spec, logging::create_discard_logger())
        .expect("Could not start scenario");
    let reports = scenario.stop().expect("Scenario did not stop cleanly");
    assert_eq!(
        reports.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        vec!["1", "2", "3"]
    );
}
