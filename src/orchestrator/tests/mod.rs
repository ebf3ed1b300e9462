use super::test_helpers::*;
use super::*;
use crate::error::{Error, FaultKind};
use crate::types::Status;

mod submit;

const URL: &str = "https://example.com/watch?v=abc";
