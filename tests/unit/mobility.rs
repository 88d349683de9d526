use swarm_simulator::logging;
use swarm_simulator::medium::SimulatedMedium;
use swarm_simulator::mobility::*;

#[test]
fn nodes_stay_within_bounds() {
    let bounds = Bounds {
        left: 0.0,
        right: 100.0,
        bottom: 0.0,
        top: 50.0,
    };
    let mut pos = Position { x: 50.0, y: 25.0 };
    let mut vel = Velocity { x: 37.0, y: -23.0 };
    let speed = vel.magnitude();

    for _ in 0..1_000 {
        update_location(&mut pos, &mut vel, 0.1, &bounds);
        assert!(pos.x >= bounds.left && pos.x <= bounds.right);
        assert!(pos.y >= bounds.bottom && pos.y <= bounds.top);
    }
    assert!((vel.magnitude() - speed).abs() < 1e-9);
}

#[test]
fn moving_node_leaves_range() {
    let medium = SimulatedMedium::new(Default::default(), logging::create_discard_logger());
    let bounds = Bounds::default();
    let mut pos = Position { x: 0.0, y: 0.0 };
    let mut vel = Velocity { x: 50.0, y: 0.0 };
    let _rx1 = medium.register("1", pos, 100.0, 8).expect("Could not register node");
    let _rx2 = medium
        .register("2", Position { x: 90.0, y: 0.0 }, 100.0, 8)
        .expect("Could not register node");
    assert_eq!(medium.neighbours_of("2"), vec![String::from("1")]);

    //Five seconds at 50 units per second
    for _ in 0..50 {
        update_location(&mut pos, &mut vel, 0.1, &bounds);
        medium.update_position("1", pos).expect("Could not update position");
    }
    assert_eq!(medium.position_of("1"), Some(Position { x: 250.0, y: 0.0 }));
    assert!(medium.neighbours_of("2").is_empty());
}
