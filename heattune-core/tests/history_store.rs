use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use heattune_core::{
    AnalysisWindow, ControllerState, ControllerStateSource, HeatTuneConfig, HistorySource,
    HvacMode, MemoryLearningStore, PidGains, SampleValue, SqliteHistoryStore, StateSample,
    SwitchState, ToleranceBand, TuningService,
};

fn setup_store() -> (tempfile::TempDir, SqliteHistoryStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.sqlite");
    let store = SqliteHistoryStore::builder()
        .path(&path)
        .create_if_missing(true)
        .build()
        .unwrap();
    store.initialize().unwrap();
    (dir, store)
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_samples_round_trip_through_sqlite() {
    let (_dir, store) = setup_store();
    store
        .record_samples(
            "switch.study",
            &[
                StateSample::switch(base(), false),
                StateSample::switch(base() + Duration::minutes(30), true),
                StateSample::unavailable(base() + Duration::minutes(45)),
                StateSample::switch(base() + Duration::minutes(60), false),
            ],
        )
        .unwrap();
    store
        .record_sample(
            "climate.study",
            &StateSample::controller(base(), HvacMode::Heat, 20.5),
        )
        .unwrap();

    let trace = store
        .fetch_history("switch.study", base(), base() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(trace.len(), 4);
    assert_eq!(trace[1].value, SampleValue::Switch(SwitchState::On));
    assert_eq!(trace[2].value, SampleValue::Unavailable);
    assert_eq!(trace[3].timestamp, base() + Duration::minutes(60));

    let climate = store
        .fetch_history("climate.study", base(), base() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(climate[0].attributes.setpoint, Some(20.5));
    assert_eq!(climate[0].attributes.hvac_mode, Some(HvacMode::Heat));
}

#[tokio::test]
async fn test_window_starts_with_state_in_effect() {
    let (_dir, store) = setup_store();
    store
        .record_samples(
            "sensor.study",
            &[
                StateSample::numeric(base(), 19.5),
                StateSample::numeric(base() + Duration::hours(1), 19.8),
                StateSample::numeric(base() + Duration::hours(3), 20.4),
            ],
        )
        .unwrap();

    let start = base() + Duration::hours(2);
    let trace = store
        .fetch_history("sensor.study", start, base() + Duration::hours(4))
        .await
        .unwrap();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].timestamp, start);
    assert_eq!(trace[0].value, SampleValue::Numeric(19.8));

    let empty = store
        .fetch_history("sensor.unknown", start, base() + Duration::hours(4))
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_controller_state_upsert() {
    let (_dir, store) = setup_store();
    assert!(store
        .controller_state("climate.study")
        .await
        .unwrap()
        .is_none());

    let state = ControllerState::heating(21.0)
        .with_tolerances(ToleranceBand::new(0.2, 0.4))
        .with_gains(PidGains::new(0.5, 0.01, 4.0));
    store.upsert_controller_state("climate.study", &state).unwrap();
    assert_eq!(
        store.controller_state("climate.study").await.unwrap(),
        Some(state)
    );

    let cooling = ControllerState {
        mode: HvacMode::Cool,
        setpoint: None,
        tolerances: None,
        gains: None,
    };
    store
        .upsert_controller_state("climate.study", &cooling)
        .unwrap();
    assert_eq!(
        store.controller_state("climate.study").await.unwrap(),
        Some(cooling)
    );
}

#[tokio::test]
async fn test_missing_database_is_reported_on_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteHistoryStore::builder()
        .path(dir.path().join("absent.sqlite"))
        .read_only(true)
        .build()
        .unwrap();
    assert!(store
        .fetch_history("switch.study", base(), base() + Duration::hours(1))
        .await
        .is_err());
}

#[tokio::test]
async fn test_service_reads_cycles_from_sqlite() {
    let (_dir, store) = setup_store();
    let mut samples = vec![StateSample::switch(base(), false)];
    // Four 30 minute cycles, one every six hours.
    for cycle in 0..4 {
        let start = base() + Duration::hours(6 * cycle + 1);
        samples.push(StateSample::switch(start, true));
        samples.push(StateSample::switch(start + Duration::minutes(30), false));
    }
    store.record_samples("switch.study", &samples).unwrap();

    let config = HeatTuneConfig::from_toml_str(
        r#"
[tuning]
kp_min = 0.3
kp_max = 1.2
ki_min = 0.005
ki_max = 0.02
kd_slow = 3.0
kd_medium = 4.0
kd_fast = 5.0

[zones.study]
display_name = "Study"
area_m2 = 11.0
heater_entity = "switch.study"
temperature_entity = "sensor.study"
climate_entity = "climate.study"
"#,
    )
    .unwrap();
    let store = Arc::new(store);
    let service = TuningService::new(
        Arc::new(config),
        store.clone(),
        store.clone(),
        Arc::new(MemoryLearningStore::new()),
    );

    let window = AnalysisWindow::new(base(), base() + Duration::hours(24));
    let cycles = service
        .analyze_cycles_in("study", window)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cycles.cycle_count, 4);
    assert_eq!(cycles.avg_cycle_minutes, 30.0);
    assert_eq!(cycles.duty_cycle_percent, 8.3);
    assert_eq!(cycles.power_w_m2, 4.2);

    assert!(!service
        .sensor_available("study", base() + Duration::hours(24))
        .await
        .unwrap());
    store
        .record_sample(
            "sensor.study",
            &StateSample::numeric(base() + Duration::hours(23), 20.1),
        )
        .unwrap();
    assert!(service
        .sensor_available("study", base() + Duration::hours(24))
        .await
        .unwrap());
}
