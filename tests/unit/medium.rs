use swarm_simulator::logging;
use swarm_simulator::medium::*;
use swarm_simulator::mobility::Position;
use swarm_simulator::node::messages::{DataMessage, Envelope, Payload};

fn data_envelope(source: &str) -> Envelope {
    let msg = DataMessage::new(source.into(), String::from("3"), vec![1, 2, 3]);
    Envelope::new(source.into(), Payload::DATA(msg))
}

#[test]
fn broadcast_reaches_nodes_in_range() {
    let medium = SimulatedMedium::new(Backpressure::Drop, logging::create_discard_logger());
    let rx1 = medium
        .register("1", Position { x: 0.0, y: 0.0 }, 100.0, 4)
        .expect("Could not register node");
    let rx2 = medium
        .register("2", Position { x: 60.0, y: 80.0 }, 100.0, 4)
        .expect("Could not register node");
    let rx3 = medium
        .register("3", Position { x: 150.0, y: 0.0 }, 100.0, 4)
        .expect("Could not register node");

    let env = data_envelope("1");
    let tx = medium.broadcast("1", &env).expect("Broadcast failed");
    assert_eq!(tx.peers_in_range, 1);
    assert_eq!(tx.delivered, 1);
    assert!(tx.size > 0);

    //Exactly on the edge of the range
    let data = rx2.try_recv().expect("Node 2 got nothing");
    let received = Envelope::from_slice(&data).expect("Could not decode envelope");
    assert_eq!(received.payload, env.payload);
    assert_eq!(received.link_quality, Some(0.0));

    assert!(rx1.try_recv().is_err());
    assert!(rx3.try_recv().is_err());
}

#[test]
fn deregistered_node_is_unreachable() {
    let medium = SimulatedMedium::new(Backpressure::default(), logging::create_discard_logger());
    let _rx1 = medium
        .register("1", Position { x: 0.0, y: 0.0 }, 100.0, 4)
        .expect("Could not register node");
    let _rx2 = medium
        .register("2", Position { x: 10.0, y: 0.0 }, 100.0, 4)
        .expect("Could not register node");
    assert!(medium
        .register("2", Position { x: 10.0, y: 0.0 }, 100.0, 4)
        .is_err());

    medium.deregister("2");
    let tx = medium
        .broadcast("1", &data_envelope("1"))
        .expect("Broadcast failed");
    assert_eq!(tx.peers_in_range, 0);
    assert!(medium.position_of("2").is_none());
    assert!(medium.update_position("2", Position::default()).is_err());
}

#[test]
fn blocked_sender_gives_up_after_timeout() {
    let medium = SimulatedMedium::new(
        Backpressure::Block { timeout: 20 },
        logging::create_discard_logger(),
    );
    let _rx1 = medium
        .register("1", Position { x: 0.0, y: 0.0 }, 100.0, 1)
        .expect("Could not register node");
    let rx2 = medium
        .register("2", Position { x: 10.0, y: 0.0 }, 100.0, 1)
        .expect("Could not register node");

    let env = data_envelope("1");
    assert_eq!(medium.broadcast("1", &env).expect("Broadcast failed").delivered, 1);
    assert_eq!(medium.broadcast("1", &env).expect("Broadcast failed").delivered, 0);

    rx2.try_recv().expect("Node 2 got nothing");
    assert_eq!(medium.broadcast("1", &env).expect("Broadcast failed").delivered, 1);
}
