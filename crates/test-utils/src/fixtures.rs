//! Common test fixtures.
//!
//! [`sample_tree`] builds the reference tree used across the workspace:
//!
//! ```text
//! /                         container   {facility: demo}
//! ├── samples               container
//! │   ├── run42             array (1000, 50) <f8, chunks (100, 50), ramp
//! │   └── run43             array (20, 10) <f8, chunks (5, 5), coded grid
//! ├── weather               table temperature/pressure, 10 rows, partitions [0, 4, 8]
//! ├── hits                  sparse (5, 5) <i8, diagonal
//! └── restricted            container
//!     └── notes             array (3,) <f8
//! ```

use serde_json::json;
use std::sync::Arc;

use adapters::{Adapter, ArrayAdapter, MapAdapter, SparseAdapter, TableAdapter};
use tree_common::{Metadata, Spec};

use crate::generators::{coded_array, diagonal_sparse, ramp_array, weather_table};

pub mod paths {
    pub const RUN42: &str = "samples/run42";
    pub const RUN43: &str = "samples/run43";
    pub const SAMPLES: &str = "samples";
    pub const WEATHER: &str = "weather";
    pub const HITS: &str = "hits";
    pub const RESTRICTED: &str = "restricted";
    pub const NOTES: &str = "restricted/notes";
}

/// Row offsets at which the `weather` table's partitions start.
pub const WEATHER_PARTITIONS: [usize; 3] = [0, 4, 8];

/// The reference tree, with typed handles on the nodes tests mutate.
pub struct SampleTree {
    pub root: Arc<dyn Adapter>,
    pub samples: Arc<MapAdapter>,
    pub run42: Arc<ArrayAdapter>,
    pub run43: Arc<ArrayAdapter>,
    pub weather: Arc<TableAdapter>,
}

pub fn run42_metadata() -> Metadata {
    Metadata::from(json!({
        "sample": {"name": "quartz", "temperature": 300},
        "operator": "alice",
        "tags": ["calibration", "beamline-7"],
        "scan_id": 42,
    }))
}

pub fn sample_tree() -> SampleTree {
    let run42 = Arc::new(
        ArrayAdapter::new(ramp_array(vec![1000, 50]), Some(vec![100, 50]))
            .expect("valid chunk grid")
            .with_metadata(run42_metadata())
            .with_specs(vec![Spec::versioned("xdi", "1.0")]),
    );
    let run43 = Arc::new(
        ArrayAdapter::new(coded_array(20, 10), Some(vec![5, 5]))
            .expect("valid chunk grid")
            .with_metadata(Metadata::from(json!({
                "sample": {"name": "silicon", "temperature": 77},
                "operator": "bob",
                "tags": ["production"],
                "scan_id": 43,
            }))),
    );
    let samples = Arc::new(
        MapAdapter::new(vec![
            ("run42".to_string(), run42.clone() as Arc<dyn Adapter>),
            ("run43".to_string(), run43.clone() as Arc<dyn Adapter>),
        ])
        .with_metadata(Metadata::from(json!({"group": "samples"}))),
    );
    let weather = Arc::new(
        TableAdapter::new(weather_table(10), WEATHER_PARTITIONS.to_vec())
            .expect("valid partitions")
            .with_metadata(Metadata::from(json!({
                "station": "north",
                "owner": {"name": "ops", "email": "ops@example.org"},
            })))
            .with_specs(vec![Spec::new("timeseries")]),
    );
    let hits: Arc<dyn Adapter> = Arc::new(
        SparseAdapter::new(diagonal_sparse(5))
            .with_metadata(Metadata::from(json!({"detector": "pixel"}))),
    );
    let notes: Arc<dyn Adapter> = Arc::new(
        ArrayAdapter::new(ramp_array(vec![3]), None)
            .expect("unchunked array")
            .with_metadata(Metadata::from(json!({"operator": "carol"}))),
    );
    let restricted: Arc<dyn Adapter> = Arc::new(
        MapAdapter::new(vec![("notes".to_string(), notes)])
            .with_metadata(Metadata::from(json!({"classified": true}))),
    );

    let root: Arc<dyn Adapter> = Arc::new(
        MapAdapter::new(vec![
            ("samples".to_string(), samples.clone() as Arc<dyn Adapter>),
            ("weather".to_string(), weather.clone() as Arc<dyn Adapter>),
            ("hits".to_string(), hits),
            ("restricted".to_string(), restricted),
        ])
        .with_metadata(Metadata::from(json!({"facility": "demo"}))),
    );

    SampleTree {
        root,
        samples,
        run42,
        run43,
        weather,
    }
}

/// The same tree as YAML, in the shape the service's `tree` section takes.
pub const SAMPLE_TREE_YAML: &str = r#"
family: container
metadata:
  facility: demo
children:
  - name: samples
    family: container
    children:
      - name: run42
        family: array
        metadata:
          sample: {name: quartz, temperature: 300}
          operator: alice
          tags: [calibration, beamline-7]
        specs:
          - {name: xdi, version: "1.0"}
        args: {dtype: "<f8", shape: [1000, 50], chunks: [100, 50], generator: ramp}
  - name: weather
    family: table
    metadata:
      station: north
    args:
      partitions: [0, 4, 8]
      columns:
        - {name: temperature, dtype: float64, values: [280.0, 280.5, 281.0, 281.5, 282.0, 282.5, 283.0, 283.5, 284.0, 284.5]}
        - {name: pressure, dtype: float64, values: [1000.0, 1001.0, 1002.0, 1003.0, 1004.0, 1005.0, 1006.0, 1007.0, 1008.0, 1009.0]}
"#;
