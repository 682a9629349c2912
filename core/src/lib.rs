// Copyright 2017-2024 Peter Williams and collaborators
// Licensed under the MIT License.

//! Core types and traits for Rubbl.
//!
//! This crate holds the pieces shared by the format crates: low-level I/O
//! helpers for binary containers and the framework for notifying users about
//! what tools are doing.

pub mod io;
#[macro_use]
pub mod notify;
