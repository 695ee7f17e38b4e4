/*!
 * Tests for configuration loading and validation
 */

use anyhow::Result;

use cueforge::app_config::{Config, TranslationProvider};
use cueforge::pipeline::PipelineSettings;
use cueforge::subtitle_processor::credit::CreditDuration;
use cueforge::validation::FrameRate;
use crate::common;

#[test]
fn test_load_withFrameRate24_shouldSelectFilmTable() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "conf.json", br#"{ "frame_rate": "24" }"#)?;

    let config = Config::load(&path)?;
    let table = config.constraint_table();

    assert_eq!(config.frame_rate, FrameRate::Fps24);
    assert_eq!(table.min_gap_ms, 125);
    assert_eq!(table.min_duration_ms, 834);
    assert_eq!(config.merge.max_duration_ms, 7000);
    Ok(())
}

#[test]
fn test_saveThenLoad_shouldKeepOverrides() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.target_language = "de".to_string();
    config.constraints.max_chars_per_line = Some(37);
    config.retiming.extend_to_speech = true;
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.target_language, "de");
    assert_eq!(loaded.constraint_table().max_chars_per_line, 37);
    assert!(loaded.retiming.extend_to_speech);
    Ok(())
}

#[test]
fn test_load_withInvalidJson_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "conf.json", b"{ not json")?;
    assert!(Config::load(&path).is_err());
    Ok(())
}

#[test]
fn test_validate_withUnknownLanguage_shouldFail() {
    let mut config = Config::default();
    config.target_language = "zz".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withBadEndpoint_shouldFail() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    for provider in config.translation.available_providers.iter_mut() {
        provider.endpoint = "not a url".to_string();
    }
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withMergeLongerThanCueMaximum_shouldFail() {
    let mut config = Config::default();
    config.merge.max_duration_ms = 9_000;
    assert!(config.validate().is_err());
}

#[test]
fn test_pipelineSettings_fromConfig_shouldFollowSwitches() {
    let mut config = Config::default();
    config.qc.enabled = false;
    config.retiming.extend_to_speech = true;
    config.retiming.max_speech_extension_ms = 700;

    let settings = PipelineSettings::from_config(&config);
    assert!(settings.qc.is_none());
    assert_eq!(settings.speech_extension_ms, Some(700));
    assert_eq!(settings.retiming.max_duration_ms, 8_000);
}

#[test]
fn test_validate_withNonPositiveTargetCps_shouldFail() {
    let mut config = Config::default();
    config.retiming.target_cps = 0.0;
    assert!(config.validate().is_err());
    config.retiming.target_cps = -1.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_load_withCreditCps_shouldDeriveDurationFromReadingSpeed() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "conf.json",
        br#"{ "credit": { "enabled": true, "text": "Vertaling: Team", "cps": 10.0 } }"#,
    )?;

    let config = Config::load(&path)?;
    config.validate()?;
    let credit = PipelineSettings::from_config(&config).credit.expect("credit is enabled");

    assert_eq!(credit.gap_ms, 3000);
    assert_eq!(credit.duration, CreditDuration::ReadingSpeed(10.0));
    assert_eq!(credit.duration.for_text(&credit.text), 1500);
    Ok(())
}

#[test]
fn test_validate_withEnabledCreditAndZeroCps_shouldFail() {
    let mut config = Config::default();
    config.credit.enabled = true;
    config.credit.cps = Some(0.0);
    assert!(config.validate().is_err());

    config.credit.enabled = false;
    assert!(config.validate().is_ok());
}
