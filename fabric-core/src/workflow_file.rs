//! The workflow YAML file format for DAG submission. Parsing lives here so
//! the demo client and the Controller's `submit_dag` deserialization share
//! one schema, but this module has no dependency on the State Store — a
//! workflow file becomes a `DagSubmission`, nothing more. Validation
//! (duplicate ids, dangling deps, cycles) is NOT performed here; call
//! `Dag::validate` after `submit_dag` inserts it, leaving validation to the
//! engine rather than the parser.

use crate::messages::DagSubmission;
use serde_yaml::Error as YamlError;

pub fn parse_workflow_yaml(yaml_str: &str) -> Result<DagSubmission, YamlError> {
    serde_yaml::from_str(yaml_str)
}
