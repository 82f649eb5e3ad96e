use proptest::prelude::*;
use segsim::event::Event;
use segsim::metrics::SimMetrics;
use segsim::network::{NetworkConfig, NetworkLink, ScriptedLoss, Segment};
use segsim::scheduler::EventScheduler;
use segsim::session::{Context, LineSource, ScriptedSource, SenderSession, SenderState};
use std::io::Cursor;
use segsim::simulation::{SimConfig, Simulation};

fn lossless(messages: &[&str]) -> Simulation {
    let config = SimConfig::default().with_trace(false).with_loss(0.0);
    Simulation::with_loss_source(
        config,
        Box::new(ScriptedSource::from_strs(messages)),
        Box::new(ScriptedLoss::never()),
    )
    .unwrap()
}

#[test]
fn two_byte_message_takes_one_segment() {
    let mut sim = lossless(&["hi"]);
    let report = sim.run().unwrap();

    assert!(report.drained);
    assert_eq!(report.delivered, vec!["hi".to_string()]);
    assert_eq!(report.metrics.segments_sent, 1);
    assert_eq!(report.metrics.acks_sent, 1);
    assert_eq!(report.metrics.retransmissions, 0);
    // the timer armed at 0 still fires at 20 and finds its entry acked
    assert_eq!(report.metrics.stale_timeouts, 1);
    assert_eq!(report.metrics.final_time, 20);
}

#[test]
fn messages_arrive_in_order() {
    let mut sim = lossless(&["first one", "second", "3"]);
    let report = sim.run().unwrap();

    assert_eq!(report.delivered, vec!["first one", "second", "3"]);
    assert_eq!(report.metrics.messages_acknowledged, 3);
    assert_eq!(report.metrics.bytes_delivered, 16);
    assert_eq!(sim.sender().state(), SenderState::Idle);
    assert_eq!(sim.receiver().expected(), 0);
    assert!(sim.receiver().buffer().is_empty());
}

#[test]
fn non_utf8_line_does_not_end_the_session() {
    let config = SimConfig::default().with_trace(false).with_loss(0.0);
    let source = LineSource::new(Cursor::new(&b"first\n\xff bad\nthird\n"[..]));
    let mut sim =
        Simulation::with_loss_source(config, Box::new(source), Box::new(ScriptedLoss::never())).unwrap();
    let report = sim.run().unwrap();

    assert_eq!(report.metrics.messages_delivered, 3);
    assert_eq!(sim.receiver().delivered()[1], b"\xff bad".to_vec());
    assert_eq!(report.delivered[2], "third");
}

#[test]
fn lossy_runs_still_deliver_everything() {
    let messages = ["hello world", "a somewhat longer message", "x"];
    for seed in 0..25 {
        let config = SimConfig::default()
            .with_trace(false)
            .with_loss(0.5)
            .with_window(2)
            .with_seed(seed)
            .with_max_events(100_000);
        let mut sim = Simulation::new(config, Box::new(ScriptedSource::from_strs(&messages))).unwrap();
        let report = sim.run().unwrap();

        assert!(report.drained, "seed {seed} hit the event cap");
        assert_eq!(report.delivered, messages, "seed {seed}");
        assert!(report.metrics.segments_lost > 0 || report.metrics.retransmissions == 0);
    }
}

#[test]
fn window_is_never_exceeded() {
    for window in 1..=4 {
        let config = SimConfig::default()
            .with_trace(false)
            .with_loss(0.3)
            .with_window(window)
            .with_seed(42 + window as u64);
        let source = ScriptedSource::from_strs(&["sliding windows are fun to watch", "ok"]);
        let mut sim = Simulation::new(config, Box::new(source)).unwrap();

        while sim.step().unwrap().is_some() {
            assert!(sim.sender().in_flight() <= window);
        }
        assert_eq!(sim.receiver().delivered().len(), 2);
    }
}

#[test]
fn wider_window_finishes_sooner() {
    let finish = |window| {
        let config = SimConfig::default().with_trace(false).with_loss(0.0).with_window(window);
        let mut sim = Simulation::with_loss_source(
            config,
            Box::new(ScriptedSource::from_strs(&["twenty bytes of data"])),
            Box::new(ScriptedLoss::never()),
        )
        .unwrap();
        sim.run().unwrap();
        sim.metrics().final_time
    };
    assert!(finish(5) < finish(1));
}

#[test]
fn report_serialises_to_json() {
    let mut sim = lossless(&["json"]);
    let report = sim.run().unwrap();

    let text = serde_json::to_string(&report).unwrap();
    let back: segsim::RunReport = serde_json::from_str(&text).unwrap();
    assert_eq!(back.delivered, report.delivered);
    assert_eq!(back.metrics, report.metrics);
}

/// Submits `message` with a window wide enough to send it in one burst and
/// returns the data segments in the order they were put on the wire.
fn burst(message: &[u8], max_payload: usize) -> Vec<Segment> {
    let mut scheduler = EventScheduler::new();
    let mut link = NetworkLink::new(
        NetworkConfig {
            transmission_delay: 5,
            loss_probability: 0.0,
        },
        Box::new(ScriptedLoss::never()),
    );
    let mut metrics = SimMetrics::default();
    let mut sender = SenderSession::new(max_payload, usize::MAX, 20);

    let mut ctx = Context::new(0, &mut scheduler, &mut link, &mut metrics);
    sender.submit_message(message.to_vec(), &mut ctx).unwrap();

    let mut segments = Vec::new();
    while let Ok(entry) = scheduler.pop() {
        if let Event::ReceivePacket { segment, .. } = entry.payload {
            segments.push(segment);
        }
    }
    segments
}

proptest! {
    #[test]
    fn segmentation_covers_message_exactly(
        message in proptest::collection::vec(any::<u8>(), 1..200),
        max_payload in 1usize..16,
    ) {
        let segments = burst(&message, max_payload);

        prop_assert_eq!(segments.len(), message.len().div_ceil(max_payload));

        for pair in segments.windows(2) {
            prop_assert!(pair[0].seq() < pair[1].seq());
            prop_assert_eq!(pair[0].end(), pair[1].seq());
        }
        for (i, segment) in segments.iter().enumerate() {
            prop_assert_eq!(segment.is_fin(), i == segments.len() - 1);
            prop_assert!(segment.len() <= max_payload);
            prop_assert!(segment.verify());
        }

        let joined: Vec<u8> = segments.iter().flat_map(|s| s.payload().to_vec()).collect();
        prop_assert_eq!(joined, message);
    }
}
