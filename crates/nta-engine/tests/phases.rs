//! Phase scheduling, enabled-phase bounds and iteration callbacks

use std::collections::BTreeSet;
use std::sync::Arc;

use nta_engine::{
    Dimensions, LinkPolicyFactory, Network, RegionImpl, RegionImplFactory, Result, TestNode,
};
use parking_lot::Mutex;

type History = Arc<Mutex<Vec<String>>>;

/// A network whose `TestNode` regions record every compute in `history`.
fn recording_network(history: &History) -> Result<Network> {
    let mut node_types = RegionImplFactory::new();
    let history = Arc::clone(history);
    node_types.register(TestNode::NODE_TYPE, TestNode::node_spec(), move |name, params| {
        let history = Arc::clone(&history);
        let node = TestNode::new(name, params)?
            .with_compute_hook(Arc::new(move |region: &str| history.lock().push(region.to_string())));
        Ok(Box::new(node) as Box<dyn RegionImpl>)
    })?;
    Ok(Network::with_factories(node_types, LinkPolicyFactory::with_builtins()))
}

fn add_regions(net: &mut Network, names: &[&str], dims: Dimensions) -> Result<()> {
    for name in names {
        net.add_region_with_dimensions(name, "TestNode", "", dims.clone())?;
    }
    Ok(())
}

fn drain(history: &History) -> Vec<String> {
    std::mem::take(&mut *history.lock())
}

fn phase_set(phases: &[u32]) -> BTreeSet<u32> {
    phases.iter().copied().collect()
}

// ============================================================================
// Phase ordering
// ============================================================================

#[test]
fn test_regions_run_in_phase_order() -> Result<()> {
    let history = History::default();
    let mut net = recording_network(&history)?;
    add_regions(&mut net, &["level1", "level2"], Dimensions::from([2, 2]))?;
    assert_eq!(net.phases("level1")?, phase_set(&[0]));
    assert_eq!(net.phases("level2")?, phase_set(&[1]));

    net.initialize()?;
    net.run(2)?;
    assert_eq!(drain(&history), ["level1", "level2", "level1", "level2"]);
    assert_eq!(net.iteration(), 2);

    net.set_phases("level1", &phase_set(&[0, 2]))?;
    net.run(2)?;
    assert_eq!(
        drain(&history),
        ["level1", "level2", "level1", "level1", "level2", "level1"]
    );
    Ok(())
}

#[test]
fn test_regions_in_one_phase_run_in_insertion_order() -> Result<()> {
    let history = History::default();
    let mut net = recording_network(&history)?;
    add_regions(&mut net, &["c", "a", "b"], Dimensions::from([1]))?;
    for name in ["c", "a", "b"] {
        net.set_phases(name, &phase_set(&[0]))?;
    }
    net.run(1)?;
    assert_eq!(drain(&history), ["c", "a", "b"]);
    Ok(())
}

#[test]
fn test_enabled_phase_bounds() -> Result<()> {
    let history = History::default();
    let mut net = recording_network(&history)?;
    assert_eq!(net.min_phase(), 0);
    assert_eq!(net.max_phase(), 0);
    assert!(net.set_min_enabled_phase(1).is_err());
    assert!(net.set_max_enabled_phase(1).is_err());

    add_regions(&mut net, &["level1", "level2", "level3"], Dimensions::from([1]))?;
    net.initialize()?;
    assert_eq!(net.min_enabled_phase(), 0);
    assert_eq!(net.max_enabled_phase(), 2);

    net.run(2)?;
    assert_eq!(
        drain(&history),
        ["level1", "level2", "level3", "level1", "level2", "level3"]
    );

    net.set_min_enabled_phase(0)?;
    net.set_max_enabled_phase(1)?;
    net.run(2)?;
    assert_eq!(drain(&history), ["level1", "level2", "level1", "level2"]);

    net.set_min_enabled_phase(1)?;
    net.set_max_enabled_phase(1)?;
    net.run(2)?;
    assert_eq!(drain(&history), ["level2", "level2"]);

    net.set_min_enabled_phase(0)?;
    net.set_max_enabled_phase(net.max_phase())?;
    net.run(2)?;
    assert_eq!(
        drain(&history),
        ["level1", "level2", "level3", "level1", "level2", "level3"]
    );

    // min above max is rejected and leaves the bounds alone
    net.set_min_enabled_phase(1)?;
    assert!(net.set_max_enabled_phase(0).is_err());
    assert_eq!(net.max_enabled_phase(), 2);
    net.set_min_enabled_phase(0)?;

    assert!(net.set_max_enabled_phase(4).is_err());
    Ok(())
}

#[test]
fn test_phases_after_region_removal() -> Result<()> {
    let history = History::default();
    let mut net = recording_network(&history)?;
    add_regions(&mut net, &["level1", "level2", "level3"], Dimensions::from([1]))?;
    net.initialize()?;

    net.set_phases("level2", &phase_set(&[4, 6]))?;
    net.remove_region("level1")?;
    // level2 in 4 and 6, level3 in 2
    assert_eq!(net.min_phase(), 2);
    assert_eq!(net.max_phase(), 6);

    net.run(2)?;
    assert_eq!(
        drain(&history),
        ["level3", "level2", "level2", "level3", "level2", "level2"]
    );
    Ok(())
}

#[test]
fn test_enabled_phases_reset_on_topology_change() -> Result<()> {
    let history = History::default();
    let mut net = recording_network(&history)?;
    add_regions(&mut net, &["level1", "level2"], Dimensions::from([1]))?;
    net.set_max_enabled_phase(0)?;

    add_regions(&mut net, &["level3"], Dimensions::from([1]))?;
    assert_eq!(net.min_enabled_phase(), 0);
    assert_eq!(net.max_enabled_phase(), 2);
    Ok(())
}

#[test]
fn test_bad_phase_sets() -> Result<()> {
    let mut net = Network::new();
    net.add_region("level1", "TestNode", "")?;

    let err = net.set_phases("level1", &BTreeSet::new()).unwrap_err();
    assert!(err.to_string().contains("Attempt to set empty phase list for region level1"));
    assert!(net.set_phases("level1", &phase_set(&[5])).is_err());
    assert_eq!(net.phases("level1")?, phase_set(&[0]));
    Ok(())
}

// ============================================================================
// Callbacks
// ============================================================================

#[test]
fn test_callbacks_run_after_each_iteration() -> Result<()> {
    let mut net = Network::new();
    add_regions(&mut net, &["level1", "level2", "level3"], Dimensions::from([1]))?;

    let seen: History = History::default();
    let iterations = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        let iterations = Arc::clone(&iterations);
        net.add_callback("Test Callback", move |net, iteration| {
            iterations.lock().push(iteration);
            let mut seen = seen.lock();
            seen.extend(net.regions().map(|region| region.name().to_string()));
        })?;
    }

    net.run(2)?;
    assert_eq!(
        drain(&seen),
        ["level1", "level2", "level3", "level1", "level2", "level3"]
    );
    assert_eq!(*iterations.lock(), [1, 2]);

    net.remove_callback("Test Callback")?;
    net.run(1)?;
    assert!(seen.lock().is_empty());
    Ok(())
}

#[test]
fn test_callback_observes_outputs() -> Result<()> {
    let mut net = Network::new();
    add_regions(&mut net, &["level1"], Dimensions::from([2]))?;

    let firsts = Arc::new(Mutex::new(Vec::new()));
    {
        let firsts = Arc::clone(&firsts);
        net.add_callback("outputs", move |net, _| {
            if let Ok(region) = net.region("level1") {
                if let Ok(data) = region.output_data("bottomUpOut") {
                    if let Ok(values) = data.as_slice::<f64>() {
                        firsts.lock().push(values[0]);
                    }
                }
            }
        })?;
    }

    net.run(3)?;
    assert_eq!(*firsts.lock(), [0.0, 1.0, 2.0]);
    Ok(())
}

#[test]
fn test_empty_network_runs_no_iterations() -> Result<()> {
    let calls = Arc::new(Mutex::new(0));
    let mut net = Network::new();
    {
        let calls = Arc::clone(&calls);
        net.add_callback("count", move |_, _| *calls.lock() += 1)?;
    }
    net.run(5)?;
    assert_eq!(*calls.lock(), 0);
    assert_eq!(net.iteration(), 0);
    Ok(())
}
