//! Fixtures shared by the integration tests
//!
//! The lab fixture is a three-step library workflow. Tube 1 is sheared into
//! tube 2 (event 20), tube 2 is pond-registered into tube 3 (event 30) and
//! tube 3 is catch-registered into tube 4 (event 40).

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use datawh::core::ancestry::TransferGraph;
use datawh::domain::{
    BatchRef, EntityId, EtlDate, EventId, LabEvent, ProcessDef, ProcessVersion, Revision,
    SampleInstance, StepDef, StepEvent, Transfer, Vessel, VesselId, WorkflowConfig, WorkflowDef,
    WorkflowVersion,
};

pub fn id(value: i64) -> EntityId {
    EntityId::new(value).unwrap()
}

pub fn rev(value: i64) -> Revision {
    Revision::new(value).unwrap()
}

pub fn vid(value: i64) -> VesselId {
    VesselId::new(value).unwrap()
}

pub fn eid(value: i64) -> EventId {
    EventId::new(value).unwrap()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

/// Minute `m` of the morning the fixture changes were committed
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
}

/// Time of the first run
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn etl_date() -> EtlDate {
    EtlDate::new(now())
}

pub fn step(name: &str, ancestry_etl: bool, event_type: &str, needs_batch: bool) -> StepDef {
    StepDef {
        name: name.to_string(),
        ancestry_etl,
        events: vec![StepEvent {
            event_type: event_type.to_string(),
            needs_order_context: false,
            needs_batch_context: needs_batch,
        }],
    }
}

/// "Exome" v1 runs "Library" v1: Shear, Pond and Catch
pub fn library_config() -> WorkflowConfig {
    library_config_with(vec![
        step("Shear", true, "Shearing", false),
        step("Pond", true, "PondRegistration", true),
        step("Catch", false, "CatchRegistration", true),
    ])
}

/// Same workflow with the given process steps
pub fn library_config_with(steps: Vec<StepDef>) -> WorkflowConfig {
    WorkflowConfig {
        workflows: vec![WorkflowDef {
            name: "Exome".to_string(),
            versions: vec![WorkflowVersion {
                version: "1".to_string(),
                effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                processes: vec!["Library".to_string()],
            }],
        }],
        processes: vec![ProcessDef {
            name: "Library".to_string(),
            versions: vec![ProcessVersion {
                version: "1".to_string(),
                effective_date: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
                steps,
            }],
        }],
    }
}

pub fn sample(key: &str) -> SampleInstance {
    SampleInstance {
        sample_key: Some(key.to_string()),
        order_id: Some(id(100)),
        order_sample_id: Some(id(101)),
        batches: vec![BatchRef {
            id: id(7),
            name: "LCSET-1".to_string(),
            created: day(1),
            workflow: Some("Exome".to_string()),
        }],
        molecular_index: Some("P7-A1".to_string()),
        position: None,
    }
}

pub fn transfer_event(id: i64, event_type: &str, d: u32, from: i64, to: i64) -> LabEvent {
    LabEvent {
        id: eid(id),
        event_type: event_type.to_string(),
        library_type: None,
        location: Some("BAY1".to_string()),
        program: None,
        date: day(d),
        in_place_vessel: None,
        transfers: vec![Transfer {
            source: vid(from),
            target: vid(to),
        }],
    }
}

pub fn library_events() -> Vec<LabEvent> {
    vec![
        transfer_event(20, "Shearing", 2, 1, 2),
        transfer_event(30, "PondRegistration", 3, 2, 3),
        transfer_event(40, "CatchRegistration", 4, 3, 4),
    ]
}

pub fn library_graph() -> TransferGraph {
    TransferGraph::new(
        (1..=4).map(|i| Vessel::tube(vid(i), format!("T{i}")).with_sample(sample("SM-1"))),
        library_events(),
    )
}

/// Lines of a committed data file of the first run, empty when not written
pub fn read_lines(dir: &std::path::Path, table: &str) -> Vec<String> {
    read_lines_at(dir, etl_date(), table)
}

/// Lines of a committed data file, empty when the file was not written
pub fn read_lines_at(dir: &std::path::Path, etl_date: EtlDate, table: &str) -> Vec<String> {
    let path = dir.join(format!("{etl_date}_{table}.dat"));
    std::fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
