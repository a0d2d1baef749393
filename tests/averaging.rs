use std::fs;

use scope_average::{
    AveragesRecord, Error, Naming, Oscilloscope, RunConfiguration, SimulatedDevice, Simulator,
};

fn simulated_config(directory: &std::path::Path) -> RunConfiguration {
    let mut config = RunConfiguration::from_toml(include_str!("../config/simulated.toml")).unwrap();
    config.acquisition.poll_interval = 1;
    config.output.directory = directory.to_owned();
    config
}

fn run(library: &mut Simulator, config: &RunConfiguration) -> scope_average::Result<std::path::PathBuf> {
    config.validate()?;
    let mut scope = Oscilloscope::open(library)?;
    let settings = scope.configure(&config.acquisition)?;
    let mut block = scope.block()?;
    let averages = scope_average::capture_averages(&mut scope, &mut block, &config.averaging)?;
    let (path, file) = scope_average::create_output(&config.output)?;
    scope_average::write_averages(file, &AveragesRecord::new(&settings, &averages))?;
    Ok(path)
}

fn read_table(text: &str) -> (Vec<&str>, Vec<Vec<f64>>) {
    let mut lines = text.lines();
    let metadata = lines.by_ref().take_while(|line| !line.starts_with("Time,")).collect();
    let rows = lines
        .map(|line| line.split(',').map(|field| field.parse().unwrap()).collect())
        .collect();
    (metadata, rows)
}

#[test]
fn test_simulated_run() {
    let directory = tempfile::tempdir().unwrap();
    let config = simulated_config(directory.path());
    let mut library = Simulator::new().unwrap();

    let path = run(&mut library, &config).unwrap();
    assert_eq!(path, directory.path().join("record_0.csv"));

    let text = fs::read_to_string(&path).unwrap();
    let (metadata, rows) = read_table(&text);
    assert!(metadata.contains(&"record length [Sa]: 80000"));
    assert!(metadata.contains(&"cycles per block: 7"));
    assert!(metadata.contains(&"number of averages: 140"));
    assert_eq!(rows.len(), 10000);
    assert!((rows[1][0] - 2e-9).abs() < 1e-15);

    // cycles start at the burst, which peaks a quarter oscillation in
    let peak = rows.iter().map(|row| row[1]).fold(f64::MIN, f64::max);
    assert!(peak > 1.8 && peak < 2.0, "peak {}", peak);
    assert!(rows[9999][1].abs() < 0.05);

    let path = run(&mut library, &config).unwrap();
    assert_eq!(path, directory.path().join("record_1.csv"));
}

#[test]
fn test_removed_writes_nothing() {
    let directory = tempfile::tempdir().unwrap();
    let mut config = simulated_config(directory.path());
    config.output.naming = Naming::Fixed;
    let device = SimulatedDevice { removed_after: Some(5), ..Default::default() };
    let mut library = Simulator::with_devices(vec![device]);

    assert!(matches!(run(&mut library, &config), Err(Error::Removed)));
    assert_eq!(fs::read_dir(directory.path()).unwrap().count(), 0);
}

#[test]
fn test_no_device() {
    let directory = tempfile::tempdir().unwrap();
    let config = simulated_config(directory.path());
    let mut library = Simulator::with_devices(vec![]);
    assert!(matches!(run(&mut library, &config), Err(Error::NotFound)));
}
