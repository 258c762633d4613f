// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::net::SocketAddr;

use clap::Parser;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://database/sqlite.db";

/// Server settings, from the command line or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "task-manager", version, about = "Task tracking web server")]
pub struct Config {
    /// SQLite database URL; the file is created when missing.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Address the HTTP server listens on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,
}
