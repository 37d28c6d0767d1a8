//! Region profiling and performance tracing
//!
//! Performance tracing is a process-wide switch, so tests touching it run
//! serially.

use std::error::Error;

use nta_engine::{Dimensions, Network, Result};
use nta_tracing::{performance, TracingConfig};
use serial_test::serial;

fn network() -> Result<Network> {
    let mut net = Network::new();
    net.add_region_with_dimensions("level1", "TestNode", "", Dimensions::from([4, 2]))?;
    net.add_region("level2", "TestNode", "")?;
    net.link("level1", "level2", "TestFanIn2", "", None, None)?;
    Ok(net)
}

#[test]
#[serial]
fn test_profiling_counts_computes() -> Result<()> {
    let mut net = network()?;
    net.enable_profiling();
    net.run(3)?;

    let level1 = net.region("level1")?;
    assert!(level1.is_profiling());
    assert_eq!(level1.compute_timer().start_count(), 3);
    assert!(!level1.compute_timer().is_running());

    net.reset_profiling();
    assert_eq!(net.region("level2")?.compute_timer().start_count(), 0);

    net.disable_profiling();
    net.run(1)?;
    assert_eq!(net.region("level2")?.compute_timer().start_count(), 0);
    Ok(())
}

#[test]
#[serial]
fn test_run_with_performance_tracing() -> std::result::Result<(), Box<dyn Error>> {
    let config = TracingConfig::for_performance();
    performance::configure(&config);
    assert!(performance::enabled());

    let subscriber = nta_tracing::build_subscriber(&config)?;
    let outcome = tracing::subscriber::with_default(subscriber, || -> Result<u64> {
        let mut net = network()?;
        net.run(2)?;
        Ok(net.iteration())
    });

    performance::configure(&TracingConfig::for_ci());
    assert!(!performance::enabled());
    assert_eq!(outcome?, 2);
    Ok(())
}
