//! Data movement along links: splitter maps, fan-in order and computed values

use nta_engine::{Dimensions, Network, Result};
use proptest::prelude::*;

fn two_level(src_dims: Dimensions) -> Result<Network> {
    let mut net = Network::new();
    net.add_region_with_dimensions("level1", "TestNode", "", src_dims)?;
    net.add_region("level2", "TestNode", "")?;
    net.link("level1", "level2", "TestFanIn2", "", None, None)?;
    Ok(net)
}

fn output_values(net: &Network, region: &str) -> Result<Vec<f64>> {
    Ok(net.region(region)?.output_data("bottomUpOut")?.as_slice::<f64>()?.to_vec())
}

// ============================================================================
// TestFanIn2
// ============================================================================

#[test]
fn test_fan_in_copies_every_element() -> Result<()> {
    let mut net = two_level(Dimensions::from([8, 4]))?;
    net.initialize()?;
    assert_eq!(net.region("level2")?.dimensions(), &Dimensions::from([4, 2]));

    let input = net.region("level2")?.input("bottomUpIn")?;
    let map = input.splitter_map()?;
    assert_eq!(map.len(), 8);
    assert_eq!(map[3][0], 12);
    assert_eq!(map[3][7], 31);
    assert_eq!(input.data().count(), 64);

    net.region("level1")?.output_data_mut("bottomUpOut")?.fill(10.0f64)?;
    net.region_mut("level2")?.input_mut("bottomUpIn")?.data_mut().fill(0.0f64)?;
    net.region_mut("level2")?.prepare_inputs()?;

    let copied = net.region("level2")?.input_data("bottomUpIn")?.as_slice::<f64>()?.to_vec();
    assert!(copied.iter().all(|&value| value == 10.0));
    Ok(())
}

#[test]
fn test_fan_in_values_after_run() -> Result<()> {
    let mut net = two_level(Dimensions::from([2, 2]))?;

    net.run(1)?;
    // level1 node n: [iteration, n]
    assert_eq!(output_values(&net, "level1")?, [0.0, 0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0]);
    // eight gathered elements summing to 6
    assert_eq!(output_values(&net, "level2")?, [8.0, 6.0]);

    net.run(1)?;
    assert_eq!(output_values(&net, "level2")?, [9.0, 10.0]);

    let input = net.region("level2")?.input("bottomUpIn")?;
    assert_eq!(
        input.get_input_for_node::<f64>(0)?,
        [1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]
    );
    assert!(input.get_input_for_node::<f64>(1).is_err());
    Ok(())
}

// ============================================================================
// Multiple links into one input
// ============================================================================

#[test]
fn test_links_are_concatenated_in_link_order() -> Result<()> {
    let mut net = Network::new();
    net.add_region_with_dimensions("a", "TestNode", "", Dimensions::from([2]))?;
    net.add_region_with_dimensions("b", "TestNode", r#"{"outputElementCount": 3}"#, Dimensions::from([2]))?;
    net.add_region("c", "TestNode", "")?;
    let identity = r#"{"mapping": "in", "rfSize": [1]}"#;
    net.link("b", "c", "UniformLink", identity, None, None)?;
    net.link("a", "c", "UniformLink", identity, None, None)?;
    net.initialize()?;

    assert_eq!(net.region("c")?.dimensions(), &Dimensions::from([2]));
    let input = net.region("c")?.input("bottomUpIn")?;
    let offsets: Vec<usize> = input.links().iter().map(|link| link.dest_offset()).collect();
    assert_eq!(offsets, [0, 6]);

    let map = input.splitter_map()?;
    assert_eq!(map[0], [0, 1, 2, 6, 7]);
    assert_eq!(map[1], [3, 4, 5, 8, 9]);
    Ok(())
}

// ============================================================================
// UniformLink
// ============================================================================

#[test]
fn test_uniform_link_end_to_end() -> Result<()> {
    let mut net = Network::new();
    net.add_region_with_dimensions("level1", "TestNode", "", Dimensions::from([6]))?;
    net.add_region("level2", "TestNode", "")?;
    net.link("level1", "level2", "UniformLink", r#"{"mapping": "in", "rfSize": [2]}"#, None, None)?;

    net.run(1)?;
    assert_eq!(net.region("level2")?.dimensions(), &Dimensions::from([3]));
    // node d gathers [0, 2d, 0, 2d + 1]: four elements, d + sum = 5d + 1
    assert_eq!(output_values(&net, "level2")?, [4.0, 1.0, 4.0, 6.0, 4.0, 11.0]);
    Ok(())
}

#[test]
fn test_uniform_link_rejects_bad_params() -> Result<()> {
    let mut net = Network::new();
    net.add_region_with_dimensions("level1", "TestNode", "", Dimensions::from([6]))?;
    net.add_region("level2", "TestNode", "")?;

    assert!(net.link("level1", "level2", "UniformLink", "{}", None, None).is_err());
    assert!(net
        .link("level1", "level2", "UniformLink", r#"{"mapping": "out", "rfSize": [2]}"#, None, None)
        .is_err());
    assert!(net.link("level1", "level2", "UniformLink", "not json", None, None).is_err());
    assert!(net.region("level2")?.input("bottomUpIn")?.links().is_empty());
    Ok(())
}

#[test]
fn test_strict_uniform_link_fails_on_remainder() -> Result<()> {
    let mut net = Network::new();
    net.add_region_with_dimensions("level1", "TestNode", "", Dimensions::from([7]))?;
    net.add_region("level2", "TestNode", "")?;
    net.link("level1", "level2", "UniformLink", r#"{"mapping": "in", "rfSize": [2]}"#, None, None)?;
    assert!(net.initialize().is_err());
    Ok(())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn fan_in_runs_are_deterministic(half_x in 1usize..5, half_y in 1usize..4, iterations in 1u64..4) {
        let dims = Dimensions::from([half_x * 2, half_y * 2]);
        let mut first = two_level(dims.clone()).unwrap();
        let mut second = two_level(dims).unwrap();
        first.run(iterations).unwrap();
        second.run(iterations).unwrap();

        let values = output_values(&first, "level2").unwrap();
        prop_assert_eq!(&values, &output_values(&second, "level2").unwrap());
        prop_assert_eq!(values.len(), half_x * half_y * 2);

        // every destination node gathers four two-element source nodes
        let expected = (8 + iterations - 1) as f64;
        prop_assert!(values.chunks_exact(2).all(|node| node[0] == expected));
    }

    #[test]
    fn fan_in_map_covers_every_source_element_once(half_x in 1usize..5, half_y in 1usize..4) {
        let mut net = two_level(Dimensions::from([half_x * 2, half_y * 2])).unwrap();
        net.initialize().unwrap();

        let region = net.region("level2").unwrap();
        let map = region.input("bottomUpIn").unwrap().splitter_map().unwrap();
        let mut offsets: Vec<usize> = map.iter().flatten().copied().collect();
        offsets.sort_unstable();
        let expected: Vec<usize> = (0..half_x * half_y * 4 * 2).collect();
        prop_assert_eq!(offsets, expected);
    }
}
