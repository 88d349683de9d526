use swarm_simulator::node::commands::Commands;
use swarm_simulator::node::messages::{AodvMessage, DataMessage, Envelope, Payload};
use swarm_simulator::tests::common::LockstepNetwork;

fn is_rreq(env: &Envelope) -> bool {
    match env.payload {
        Payload::AODV(AodvMessage::RREQ(_)) => true,
        _ => false,
    }
}

fn is_data(env: &Envelope) -> bool {
    match env.payload {
        Payload::DATA(_) => true,
        _ => false,
    }
}

#[test]
fn discovery_over_five_hops() {
    let mut net = LockstepNetwork::line(5, 100.0, 120.0);
    assert_eq!(net.neighbours("3"), vec![String::from("2"), String::from("4")]);

    net.command("1", Commands::Discover(String::from("5")));
    net.run();

    let route = net
        .reactor("1")
        .routing()
        .table()
        .get("5")
        .expect("Node 1 has no route to 5");
    assert_eq!(route.next_hop, "2");
    assert_eq!(route.hop_count, 4);

    //Reverse path towards the originator
    let route = net
        .reactor("5")
        .routing()
        .table()
        .get("1")
        .expect("Node 5 has no route to 1");
    assert_eq!(route.next_hop, "4");
    assert_eq!(route.hop_count, 4);

    //Every node floods the request once, the destination doesn't
    let originated = net.count_transmissions(|e| is_rreq(e));
    assert_eq!(originated, 4);
}

#[test]
fn data_delivered_once_along_the_line() {
    let mut net = LockstepNetwork::line(5, 100.0, 120.0);

    net.command("1", Commands::Data(String::from("5"), b"telemetry".to_vec()));
    assert_eq!(net.reactor("1").pending_for("5"), 1);
    net.run();

    assert_eq!(net.reactor("1").pending_for("5"), 0);
    let delivered: &[DataMessage] = net.reactor("5").transport().delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].data, b"telemetry".to_vec());
    assert_eq!(delivered[0].sender, "1");

    let checksum = delivered[0].checksum.clone();
    for id in &["2", "3", "4"] {
        assert!(
            net.reactor(id).transport().has_seen(&checksum),
            "Node {} didn't see the data",
            id
        );
        assert!(net.reactor(id).transport().delivered().is_empty());
    }
    assert_eq!(net.count_transmissions(|e| is_data(e)), 4);
}

#[test]
fn control_delivered_to_recipient() {
    let mut net = LockstepNetwork::line(3, 100.0, 120.0);
    net.command("1", Commands::Discover(String::from("3")));
    net.run();

    let cmd: Commands = "CONTROL 3 goto x=10 y=20".parse().expect("Could not parse command");
    net.command("1", cmd);
    net.run();

    let delivered = net.reactor("3").control().delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].command, "goto");
    assert_eq!(delivered[0].params.get("x").map(|v| v.as_str()), Some("10"));
    assert!(net.reactor("2").control().delivered().is_empty());
}

#[test]
fn unknown_route_triggers_single_discovery() {
    let mut net = LockstepNetwork::line(3, 100.0, 120.0);
    let msg = DataMessage::new(String::from("1"), String::from("9"), vec![7]);
    let data = Envelope::new(String::from("1"), Payload::DATA(msg))
        .to_vec()
        .expect("Could not encode envelope");

    net.inject("2", data.clone());
    net.run();
    net.inject("2", data);
    net.run();

    let from_2 = net
        .transmissions
        .iter()
        .filter(|(sender, env)| sender == "2" && is_rreq(env))
        .count();
    assert_eq!(from_2, 1);
    assert!(net.reactor("2").routing().table().get("9").is_none());
}

#[test]
fn hello_stays_local() {
    let mut net = LockstepNetwork::line(3, 100.0, 120.0);
    net.hello("1");
    net.run();

    assert_eq!(net.transmissions.len(), 1);
    let route = net
        .reactor("2")
        .routing()
        .table()
        .get("1")
        .expect("Node 2 has no route to 1");
    assert_eq!(route.hop_count, 1);
    assert_eq!(route.next_hop, "1");
    assert!(net.reactor("3").routing().table().get("1").is_none());
}

#[test]
fn neighbour_routes_from_hellos() {
    let mut net = LockstepNetwork::line(4, 100.0, 120.0);
    net.hello_all();
    net.run();

    for (id, neighbours) in &[("1", vec!["2"]), ("2", vec!["1", "3"]), ("4", vec!["3"])] {
        let routes = net.reactor(id).routing().table().entries();
        let dests: Vec<&str> = routes.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(&dests, neighbours);
    }
}
