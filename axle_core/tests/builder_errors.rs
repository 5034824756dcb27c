use std::sync::Arc;

use axle_core::mocks::{RecordingActuator, ScriptedTach};
use axle_core::{BuildError, ControllerCfg, RpmController};

#[test]
fn try_build_reports_missing_handles() {
    let err = RpmController::builder().try_build().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingTachometer)
    ));

    let err = RpmController::builder()
        .with_tachometer(Arc::new(ScriptedTach::new_enabled()))
        .try_build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingActuator)
    ));
}

#[test]
fn invalid_config_is_rejected_at_build_time() {
    let err = RpmController::builder()
        .with_tachometer(Arc::new(ScriptedTach::new_enabled()))
        .with_actuator(Arc::new(RecordingActuator::default()))
        .with_cfg(ControllerCfg {
            update_rate_ms: 0,
            ..ControllerCfg::default()
        })
        .build()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}
