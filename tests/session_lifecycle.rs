use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rstest::rstest;
use time::{Date, Month, PrimitiveDateTime, Time, UtcOffset};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use nirlink::{
    EndpointId, EngineError, EngineEvent, Intent, IssuedOp, LinkState, OpLog, OperationStatus,
    ProtocolViolation, ScanIndexRef, ScanRequest, ScriptedLink, Session, TimeRequest,
    TransportEvent,
};

fn fixed_timestamp() -> time::OffsetDateTime {
    let date = Date::from_calendar_date(2026, Month::February, 15)
        .expect("calendar date used in tests should be valid");
    let time = Time::from_hms(21, 4, 5).expect("time used in tests should be valid");
    PrimitiveDateTime::new(date, time).assume_offset(UtcOffset::UTC)
}

fn new_session() -> (
    Session<ScriptedLink>,
    OpLog,
    UnboundedReceiver<EngineEvent>,
) {
    let (link, log) = ScriptedLink::new();
    let (outward_tx, outward_rx) = unbounded_channel();
    (Session::new(link, outward_tx), log, outward_rx)
}

fn ready_session() -> (
    Session<ScriptedLink>,
    OpLog,
    UnboundedReceiver<EngineEvent>,
) {
    let (mut session, log, mut outward) = new_session();
    session.begin_connect();
    session.handle_transport_event(TransportEvent::LinkUp);
    session.handle_transport_event(TransportEvent::ServicesDiscovered { ok: true });

    loop {
        let subscriptions: Vec<EndpointId> = log
            .take()
            .into_iter()
            .filter_map(|op| match op {
                IssuedOp::Subscribe(endpoint) => Some(endpoint),
                _ => None,
            })
            .collect();
        if subscriptions.is_empty() {
            break;
        }
        for endpoint in subscriptions {
            session.handle_transport_event(TransportEvent::SubscribeComplete {
                endpoint,
                status: OperationStatus::Success,
            });
        }
    }
    assert_eq!(Some(EngineEvent::SessionReady), outward.try_recv().ok());

    (session, log, outward)
}

fn sample_intents() -> Vec<Intent> {
    vec![
        Intent::GetDeviceInfo,
        Intent::GetStatus,
        Intent::GetScanConfigurations,
        Intent::SetActiveConfiguration { index: 1 },
        Intent::GetActiveConfigurationIndex,
        Intent::GetActiveConfigurationData,
        Intent::RunScan(ScanRequest {
            save_to_sd: false,
            name_prefix: "Scan".to_string(),
            fetch_calibration: false,
            timestamp: fixed_timestamp(),
        }),
        Intent::GetStoredScans,
        Intent::DeleteScan {
            index: ScanIndexRef::new([1, 2, 3, 4]),
        },
        Intent::UpdateThresholds {
            temperature_celsius: 20.0,
            humidity_percent: 50.0,
        },
        Intent::SetTime(TimeRequest {
            timestamp: fixed_timestamp(),
            name_prefix: "Scan".to_string(),
        }),
    ]
}

#[test]
fn cascade_subscribes_in_the_declared_order_before_ready() {
    let (mut session, log, mut outward) = new_session();
    session.begin_connect();
    assert_eq!(LinkState::Connecting, session.state());

    session.handle_transport_event(TransportEvent::LinkUp);
    assert_eq!(LinkState::Discovering, session.state());
    assert_eq!(vec![IssuedOp::DiscoverServices], log.take());

    session.handle_transport_event(TransportEvent::ServicesDiscovered { ok: true });
    assert_eq!(LinkState::SubscribingNotifications, session.state());

    let expected_order = [
        EndpointId::RefCalCoefficientsReturn,
        EndpointId::RefCalMatrixReturn,
        EndpointId::StartScan,
        EndpointId::ScanNameReturn,
        EndpointId::ScanTypeReturn,
        EndpointId::ScanDateReturn,
        EndpointId::PacketFormatVersionReturn,
        EndpointId::SerializedScanDataReturn,
        EndpointId::StoredConfListReturn,
        EndpointId::SdScanIndicesReturn,
        EndpointId::DeleteScan,
        EndpointId::ScanConfDataReturn,
    ];
    for (position, expected) in expected_order.into_iter().enumerate() {
        let ops = log.take();
        assert_eq!(
            vec![IssuedOp::Subscribe(expected)],
            ops,
            "subscription {position} out of order"
        );
        assert_eq!(
            LinkState::SubscribingNotifications,
            session.state(),
            "the session may not become ready before the last acknowledgement"
        );
        session.handle_transport_event(TransportEvent::SubscribeComplete {
            endpoint: expected,
            status: OperationStatus::Success,
        });
    }

    assert_eq!(LinkState::Ready, session.state());
    assert_eq!(Some(EngineEvent::SessionReady), outward.try_recv().ok());
    assert!(log.is_empty());
}

#[test]
fn intents_queue_fifo_while_busy() {
    let (mut session, log, mut outward) = ready_session();

    session.submit(Intent::GetActiveConfigurationIndex);
    assert_eq!(LinkState::Busy, session.state());
    session.submit(Intent::GetDeviceInfo);
    assert_eq!(1, session.pending_intents());
    assert_eq!(vec![IssuedOp::Read(EndpointId::ActiveScanConf)], log.take());

    session.handle_transport_event(TransportEvent::ReadComplete {
        endpoint: EndpointId::ActiveScanConf,
        status: OperationStatus::Success,
        value: vec![0x01, 0x00],
    });

    // First intent reported, second started automatically.
    assert_matches!(
        outward.try_recv(),
        Ok(EngineEvent::ProcedureFinished { outcome: Ok(_), .. })
    );
    assert_eq!(LinkState::Busy, session.state());
    assert_eq!(0, session.pending_intents());
    assert_eq!(
        vec![IssuedOp::Read(EndpointId::ManufacturerName)],
        log.take()
    );
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
fn disconnect_mid_procedure_fails_with_disconnected(#[case] steps_before_disconnect: usize) {
    for intent in sample_intents() {
        let (mut session, log, mut outward) = ready_session();
        session.submit(intent.clone());
        assert_eq!(LinkState::Busy, session.state());
        session.submit(Intent::GetStatus);
        assert_eq!(1, session.pending_intents());

        // Walk a few generic steps before pulling the link, acknowledging
        // whatever operation the procedure issued.
        for _ in 0..steps_before_disconnect {
            let Some(op) = log.take().into_iter().next() else {
                break;
            };
            match op {
                IssuedOp::Read(endpoint) => {
                    session.handle_transport_event(TransportEvent::ReadComplete {
                        endpoint,
                        status: OperationStatus::Success,
                        value: vec![0x01, 0x00],
                    });
                }
                IssuedOp::Write(endpoint, _payload) => {
                    session.handle_transport_event(TransportEvent::WriteComplete {
                        endpoint,
                        status: OperationStatus::Success,
                    });
                }
                _other => {}
            }
        }

        if session.state() != LinkState::Busy {
            // Short procedures can finish legitimately before the pull.
            continue;
        }
        session.handle_transport_event(TransportEvent::LinkDown);

        assert_eq!(LinkState::Disconnected, session.state());
        assert_eq!(0, session.pending_intents(), "the queue must be cleared");

        let mut saw_disconnect_failure = false;
        let mut saw_session_disconnected = false;
        while let Ok(event) = outward.try_recv() {
            match event {
                EngineEvent::ProcedureFinished {
                    outcome: Err(EngineError::Disconnected),
                    ..
                } => saw_disconnect_failure = true,
                EngineEvent::SessionDisconnected => saw_session_disconnected = true,
                _other => {}
            }
        }
        assert!(
            saw_disconnect_failure,
            "{intent:?} must fail with Disconnected"
        );
        assert!(saw_session_disconnected);

        // Reset is idempotent: a second disconnect changes nothing and emits
        // nothing further.
        session.handle_transport_event(TransportEvent::LinkDown);
        assert_eq!(LinkState::Disconnected, session.state());
        assert!(outward.try_recv().is_err());
    }
}

#[test]
fn completion_with_no_active_procedure_is_a_noop() {
    let (mut session, log, mut outward) = ready_session();

    session.handle_transport_event(TransportEvent::ReadComplete {
        endpoint: EndpointId::BatteryLevel,
        status: OperationStatus::Success,
        value: vec![0x50],
    });
    session.handle_transport_event(TransportEvent::Notification {
        endpoint: EndpointId::DeleteScan,
        payload: vec![0x00],
    });

    assert_eq!(LinkState::Ready, session.state());
    assert!(outward.try_recv().is_err());
    assert!(log.is_empty());
}

#[test]
fn submitting_while_disconnected_fails_immediately() {
    let (mut session, _log, mut outward) = new_session();

    session.submit(Intent::GetDeviceInfo);

    assert_matches!(
        outward.try_recv(),
        Ok(EngineEvent::ProcedureFinished {
            outcome: Err(EngineError::Disconnected),
            ..
        })
    );
}

#[test]
fn step_timeout_fails_the_procedure_and_resets_the_session() {
    let (mut session, log, mut outward) = ready_session();
    session.submit(Intent::GetDeviceInfo);
    log.take();

    session.fail_active_on_timeout();

    assert_matches!(
        outward.try_recv(),
        Ok(EngineEvent::ProcedureFinished {
            outcome: Err(EngineError::Timeout),
            ..
        })
    );
    assert_eq!(Some(EngineEvent::SessionDisconnected), outward.try_recv().ok());
    assert_eq!(LinkState::Disconnected, session.state());
}

#[test]
fn unexpected_notification_aborts_the_procedure() {
    let (mut session, log, mut outward) = ready_session();
    session.submit(Intent::GetDeviceInfo);
    log.take();

    session.handle_transport_event(TransportEvent::Notification {
        endpoint: EndpointId::ScanNameReturn,
        payload: vec![0x01],
    });

    assert_matches!(
        outward.try_recv(),
        Ok(EngineEvent::ProcedureFinished {
            outcome: Err(EngineError::ProtocolViolation {
                violation: ProtocolViolation::UnexpectedEndpoint,
                ..
            }),
            ..
        })
    );
    assert_eq!(LinkState::Ready, session.state());
}

#[test]
fn failed_read_status_aborts_with_transport_failure() {
    let (mut session, log, mut outward) = ready_session();
    session.submit(Intent::GetDeviceInfo);
    log.take();

    session.handle_transport_event(TransportEvent::ReadComplete {
        endpoint: EndpointId::ManufacturerName,
        status: OperationStatus::Failure,
        value: Vec::new(),
    });

    assert_matches!(
        outward.try_recv(),
        Ok(EngineEvent::ProcedureFinished {
            outcome: Err(EngineError::TransportOperationFailed { .. }),
            ..
        })
    );
    assert_eq!(LinkState::Ready, session.state());
}
