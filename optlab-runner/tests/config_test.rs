//! Loading configs and price tables from disk, then running a search
//! driven entirely by the loaded config.

use std::io::Write;
use std::sync::Arc;

use optlab_runner::{
    load_frame, search, write_trajectory, ConfigError, LoadError, PeriodMode, SearchConfig,
    SearchMethod, SignalGenerator, SmaCross,
};

const CONFIG: &str = r#"
output_count = 3
parallel = false
seed = 11
objective = "TOTAL_RETURN"

[method]
type = "INCREMENTAL"
init_step = 4.0
inc_step = 2.0
min_step = 1.0

[cost]
buy_rate = 0.0003
buy_min = 5.0

[cash_plan]
dates = ["2024-01-02", "2024-02-01"]
amounts = [100000.0, 20000.0]

[trading]
signal_kind = "PS"
lot_buy = 10.0
lot_sell = 10.0

[[space]]
bounds = [2, 6]
kind = "int"

[[space]]
bounds = [10, 20]
"#;

fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn price_csv(days: usize) -> String {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let mut text = String::from("date,AAA,BBB\n");
    for i in 0..days {
        let t = i as f64;
        let date = start + chrono::Duration::days(i as i64);
        let a = 50.0 + 4.0 * (t / 6.0).sin() + 0.1 * t;
        let b = 80.0 - 3.0 * (t / 4.0).cos();
        text.push_str(&format!("{date},{a:.4},{b:.4}\n"));
    }
    text
}

#[test]
fn test_load_config_from_file() {
    let file = write_temp(CONFIG, ".toml");
    let config = SearchConfig::load(file.path()).unwrap();

    assert_eq!(config.output_count, 3);
    assert!(!config.parallel);
    assert_eq!(
        config.method,
        SearchMethod::Incremental {
            init_step: 4.0,
            inc_step: 2.0,
            min_step: 1.0
        }
    );
    assert_eq!(config.cash_plan.amounts, vec![100_000.0, 20_000.0]);
    assert_eq!(config.space().unwrap().unwrap().dim(), 2);

    let options = config.search_options();
    assert_eq!(options.run_id, config.run_id());
    assert!(!options.harness.parallel);
}

#[test]
fn test_missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SearchConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_malformed_config_is_parse_error() {
    let file = write_temp("output_count = \"many\"\n", ".toml");
    assert!(matches!(
        SearchConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_config_survives_toml_roundtrip_on_disk() {
    let config = SearchConfig::from_toml_str(CONFIG).unwrap();
    let file = write_temp(&config.to_toml_string().unwrap(), ".toml");
    let reloaded = SearchConfig::load(file.path()).unwrap();
    assert_eq!(config, reloaded);
    assert_eq!(config.run_id(), reloaded.run_id());
}

#[test]
fn test_missing_price_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_frame(&dir.path().join("prices.csv")),
        Err(LoadError::Io { .. })
    ));
}

#[test]
fn test_config_driven_search_and_export() {
    let config = SearchConfig::from_toml_str(CONFIG).unwrap();
    let prices_file = write_temp(&price_csv(60), ".csv");
    let prices = Arc::new(load_frame(prices_file.path()).unwrap());

    let generator = Arc::new(SmaCross::default());
    let space = config.space().unwrap().unwrap_or_else(|| generator.space());
    let evaluator = config.evaluator(generator, prices).unwrap();

    let outcome = search(
        &config.method,
        &space,
        &evaluator,
        &config.search_options(),
        None,
    )
    .unwrap();
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.len(), 3);
    let (best, score) = outcome.best().unwrap();
    assert!(score.is_finite());
    assert!(space.encloses(best));

    let trajectory = evaluator.trajectory(best).unwrap();
    assert!(trajectory.total_injected() > 100_000.0);

    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join("trajectory.csv");
    write_trajectory(&out_path, &trajectory).unwrap();
    let text = std::fs::read_to_string(&out_path).unwrap();
    assert!(text.starts_with("date,AAA,BBB,cash,fee,value,injected"));
    assert_eq!(text.lines().count(), trajectory.rows().len() + 1);
}

#[test]
fn test_settlement_and_sub_periods_from_config() {
    let text = format!(
        "{CONFIG}\n[periods]\ntype = \"MULTIPLE\"\ncount = 3\nlength = 0.5\n"
    )
    .replace("lot_sell = 10.0", "lot_sell = 10.0\ncash_delivery_period = 1");
    let config = SearchConfig::from_toml_str(&text).unwrap();
    assert_eq!(config.loop_options().cash_delivery_period, 1);
    assert_eq!(
        config.periods,
        PeriodMode::Multiple {
            count: 3,
            length: 0.5
        }
    );

    let prices_file = write_temp(&price_csv(90), ".csv");
    let prices = Arc::new(load_frame(prices_file.path()).unwrap());
    let generator = Arc::new(SmaCross::default());
    let space = config.space().unwrap().unwrap_or_else(|| generator.space());
    let evaluator = config.evaluator(generator, prices).unwrap();

    let outcome = search(
        &config.method,
        &space,
        &evaluator,
        &config.search_options(),
        None,
    )
    .unwrap();
    assert_eq!(outcome.len(), 3);
    assert!(outcome.scores.iter().all(|s| !s.is_nan()));
}
