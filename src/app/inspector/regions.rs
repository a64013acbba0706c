#![warn(clippy::all, rust_2018_idioms)]

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Regions skipped even when Inspector is published there. They need
/// separate partition credentials that a commercial-partition session never
/// has.
pub const EXCLUDED_REGIONS: [&str; 4] = ["cn-north-1", "cn-northwest-1", "us-gov-east-1", "us-gov-west-1"];

/// One AWS partition and the regions where Inspector Classic has an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub inspector_regions: &'static [&'static str],
}

/// Inspector Classic endpoint metadata per partition.
pub static PARTITIONS: Lazy<Vec<Partition>> = Lazy::new(|| {
    vec![
        // aws
        Partition {
            inspector_regions: &[
                "ap-northeast-1",
                "ap-northeast-2",
                "ap-south-1",
                "ap-southeast-2",
                "eu-central-1",
                "eu-north-1",
                "eu-west-1",
                "eu-west-2",
                "us-east-1",
                "us-east-2",
                "us-west-1",
                "us-west-2",
            ],
        },
        // aws-cn
        Partition {
            inspector_regions: &["cn-north-1", "cn-northwest-1"],
        },
        // aws-us-gov
        Partition {
            inspector_regions: &["us-gov-east-1", "us-gov-west-1"],
        },
        // aws-iso
        Partition {
            inspector_regions: &[],
        },
    ]
});

/// All regions where Inspector runs, across every partition, minus
/// [`EXCLUDED_REGIONS`]. Partition order is kept and duplicates dropped.
pub fn inspector_regions() -> Vec<String> {
    regions_from_partitions(&PARTITIONS, &EXCLUDED_REGIONS)
}

pub fn regions_from_partitions(partitions: &[Partition], excluded: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    partitions
        .iter()
        .flat_map(|p| p.inspector_regions.iter().copied())
        .filter(|region| !excluded.contains(region))
        .filter(|region| seen.insert(*region))
        .map(str::to_string)
        .collect()
}
