//! JSON input trees and result files.
//!
//! A node is either a matrix (array of number arrays) or
//! `{"operator": "+" | "*" | "-" | "T", "operands": [node, ...]}`.
//! Results are written as `{"result": [[...]]}` or `{"error": "..."}`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::{ComputationNode, NodeKind};
use crate::error::{LaeError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Matrix(Vec<Vec<f64>>),
    Operation {
        operator: String,
        operands: Vec<RawNode>,
    },
}

impl TryFrom<RawNode> for ComputationNode {
    type Error = LaeError;

    fn try_from(raw: RawNode) -> Result<Self> {
        match raw {
            RawNode::Matrix(rows) => Ok(ComputationNode::matrix(rows)),
            RawNode::Operation { operator, operands } => {
                let kind = NodeKind::from_symbol(&operator).ok_or_else(|| {
                    LaeError::InvalidArgument(format!("unknown operator {operator:?}"))
                })?;
                let children = operands
                    .into_iter()
                    .map(ComputationNode::try_from)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ComputationNode::op(kind, children))
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Output<'a> {
    Result(&'a [Vec<f64>]),
    Error(&'a str),
}

pub fn parse_tree(json: &str) -> Result<ComputationNode> {
    let raw: RawNode = serde_json::from_str(json)?;
    ComputationNode::try_from(raw)
}

pub fn read_tree(path: &Path) -> Result<ComputationNode> {
    parse_tree(&fs::read_to_string(path)?)
}

pub fn render_result(rows: &[Vec<f64>]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Output::Result(rows))?)
}

pub fn render_error(message: &str) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Output::Error(message))?)
}

pub fn write_result(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    fs::write(path, render_result(rows)?)?;
    Ok(())
}

pub fn write_error(path: &Path, message: &str) -> Result<()> {
    fs::write(path, render_error(message)?)?;
    Ok(())
}
