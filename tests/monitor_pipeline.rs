use alarm_monitor::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Rig {
    monitor: AlarmMonitor,
    opener: Arc<SimulatedOpener>,
    _dir: tempfile::TempDir,
}

fn test_config(dir: &tempfile::TempDir) -> MonitorConfig {
    let mut config = MonitorConfig {
        database_path: dir.path().join("alarm_history.db"),
        history_limit: 3,
        ..Default::default()
    };
    config.serial.reader.poll_interval_ms = 5;
    config.serial.reader.read_timeout_ms = 20;
    config
}

async fn rig_with(config: MonitorConfig, dir: tempfile::TempDir) -> Rig {
    let store = SqliteEventStore::open(config.store_config()).await.unwrap();
    let opener = SimulatedOpener::new();
    let monitor = AlarmMonitor::with_parts(config, Arc::new(store), opener.clone())
        .await
        .unwrap();
    Rig { monitor, opener, _dir: dir }
}

async fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    rig_with(config, dir).await
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

async fn event_count(monitor: &AlarmMonitor) -> usize {
    monitor.query(None, None, None).await.unwrap().len()
}

#[tokio::test]
async fn on_on_off_on_over_the_wire() {
    let rig = rig().await;
    let mut rx = rig.monitor.subscribe();
    tokio_test::assert_ok!(rig.monitor.connect("COM1", 9600).await);
    let port = rig.opener.last_transport().unwrap();

    port.inject_rx(b"ALARME_ON\r\nALARME_ON\r\nALARME_OFF\r\nALARME_ON\r\n").await;
    eventually(|| async { event_count(&rig.monitor).await == 3 }).await;

    let kinds: Vec<EventKind> = rig
        .monitor
        .query(None, None, None)
        .await
        .unwrap()
        .into_iter()
        .rev()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::AlarmActivated,
            EventKind::AlarmDeactivated,
            EventKind::AlarmActivated
        ]
    );

    let notifications = drain(&mut rx);
    let raised = notifications
        .iter()
        .filter(|n| matches!(n, Notification::AlertRaised { .. }))
        .count();
    let cleared = notifications
        .iter()
        .filter(|n| matches!(n, Notification::AlertCleared { .. }))
        .count();
    assert_eq!((raised, cleared), (2, 1));

    let state = rig.monitor.state().await;
    assert_eq!(state.value, AlarmValue::Active);
    assert_eq!(state.active_alert, rig.monitor.active_alert());

    rig.monitor.disconnect().await;
    assert!(!rig.monitor.is_connected());
}

#[tokio::test]
async fn second_connect_is_refused() {
    let rig = rig().await;
    tokio_test::assert_ok!(rig.monitor.connect("COM1", 9600).await);
    let err = tokio_test::assert_err!(rig.monitor.connect("COM1", 9600).await);
    assert_eq!(err.kind, ConnectionErrorKind::AlreadyOpen);
    assert_eq!(rig.opener.open_count(), 1);
    rig.monitor.disconnect().await;
    rig.monitor.disconnect().await;
}

#[tokio::test]
async fn loss_requires_explicit_reconnect() {
    let rig = rig().await;
    rig.monitor.connect_default("COM4").await.unwrap();
    rig.opener.last_transport().unwrap().simulate_disconnect();
    eventually(|| async { matches!(rig.monitor.status(), ReaderStatus::Lost { .. }) }).await;

    // Bytes arriving on the dead link are never read.
    let dead = rig.opener.last_transport().unwrap();
    dead.inject_rx(b"ALARME_ON\n").await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(event_count(&rig.monitor).await, 0);

    rig.monitor.connect_default("COM4").await.unwrap();
    rig.opener.last_transport().unwrap().inject_rx(b"ALARME_ON\n").await;
    eventually(|| async { event_count(&rig.monitor).await == 1 }).await;
    rig.monitor.disconnect().await;
}

#[tokio::test]
async fn open_failure_is_reported() {
    let rig = rig().await;
    rig.opener.fail_opens(Some("access denied"));
    let err = rig.monitor.connect("COM9", 9600).await.unwrap_err();
    assert_eq!(err.kind, ConnectionErrorKind::OpenFailure);
    assert!(!rig.monitor.is_connected());
}

#[tokio::test]
async fn recent_history_and_range_queries() {
    let rig = rig().await;
    rig.monitor.connect("COM1", 9600).await.unwrap();
    let port = rig.opener.last_transport().unwrap();
    port.inject_rx(b"ALARME_ON\nALARME_OFF\nALARME_ON\nALARME_OFF\nALARME_ON\n").await;
    eventually(|| async { event_count(&rig.monitor).await == 5 }).await;
    rig.monitor.disconnect().await;

    let recent = rig.monitor.recent_history().await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.windows(2).all(|w| w[0].id > w[1].id));
    assert_eq!(recent[0], rig.monitor.latest_event().await.unwrap().unwrap());

    let empty = rig.monitor.query(None, None, Some(0)).await.unwrap();
    assert!(empty.is_empty());

    let before_any = rig
        .monitor
        .query(None, Some(Timestamp::new("2000-01-01 00:00:00")), None)
        .await
        .unwrap();
    assert!(before_any.is_empty());

    // The burst may straddle midnight, so span the days it was stored on.
    let all = rig.monitor.query(None, None, None).await.unwrap();
    let day_of = |e: &Event| e.timestamp.to_naive().unwrap().date();
    let (first_day, last_day) = (day_of(all.last().unwrap()), day_of(&all[0]));
    let whole_days = rig
        .monitor
        .query_with(&EventQuery::between_dates(first_day, last_day))
        .await
        .unwrap();
    assert_eq!(whole_days, all);

    let last_day_only = rig
        .monitor
        .query_with(&EventQuery::between_dates(last_day, last_day))
        .await
        .unwrap();
    assert!(last_day_only.contains(&recent[0]));
}

#[tokio::test]
async fn history_survives_restart_and_can_seed_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    {
        let rig = rig_with(config.clone(), tempfile::tempdir().unwrap()).await;
        rig.monitor.connect("COM1", 9600).await.unwrap();
        rig.opener.last_transport().unwrap().inject_rx(b"ALARME_ON\n").await;
        eventually(|| async { event_count(&rig.monitor).await == 1 }).await;
        rig.monitor.disconnect().await;
    }

    // Default: start Idle regardless of history.
    let plain = rig_with(config.clone(), tempfile::tempdir().unwrap()).await;
    assert_eq!(plain.monitor.state().await.value, AlarmValue::Idle);
    assert_eq!(event_count(&plain.monitor).await, 1);
    drop(plain);

    let seeded_config = MonitorConfig {
        seed_state_from_store: true,
        ..config
    };
    let seeded = rig_with(seeded_config, dir).await;
    let state = seeded.monitor.state().await;
    assert_eq!(state.value, AlarmValue::Active);
    assert!(state.active_alert.is_some());
}
