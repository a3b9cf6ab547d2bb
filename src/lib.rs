// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `waypoint` — the per-connection HTTP/1.1 state machine at the heart of a
//! non-blocking worker core.
//!
//! A [`worker::Worker`] owns one `mio` event loop and a `slab::Slab` of
//! [`connection::Connection`]s. Each connection moves bytes between a
//! socket and a [`hooks::LogicalRequest`] through a pair of
//! [`chunkqueue::ChunkQueue`] pipelines, coordinating parsing
//! ([`parser::h1::request`]), transfer-coding
//! ([`parser::h1::response`]), keep-alive reuse ([`keepalive`]), and
//! throttling ([`throttle`]). [`server::Server`] wires a configured set of
//! these workers, one per thread, around a shared listening socket.
//!
//! Routing ("which action handles this request") and TLS termination are
//! explicitly out of scope — see [`hooks::Action`] for the seam a real
//! router would occupy.

pub mod chunkqueue;
pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod keepalive;
pub mod net;
pub mod parser;
pub mod server;
pub mod throttle;
pub mod worker;
