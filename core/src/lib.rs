// Copyright 2020 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A per-file version-control store for configuration files.
//!
//! For each tracked file, [`dotfile::DotFile`] holds either a single
//! current snapshot or a full branching [`history::HistoryTree`], built out
//! of textual patches ([`patch`]) relative to each commit's parent. The
//! [`store`] module reconciles a declarative [`config::Config`] against a
//! previously-persisted store directory and the live filesystem
//! ([`fs::Filesystem`]) into the in-memory [`store::Store`], and writes it
//! back out the same way.
//!
//! Command-line surface, YAML config parsing, and pretty-printing are
//! external collaborators, not part of this crate.

pub mod checksum;
pub mod config;
pub mod dotfile;
pub mod fs;
pub mod history;
pub mod patch;
pub mod store;
