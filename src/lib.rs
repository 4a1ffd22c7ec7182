/*
 * This file is part of thermguard.
 *
 * Copyright (C) 2025 thermguard contributors
 *
 * thermguard is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * thermguard is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with thermguard. If not, see <https://www.gnu.org/licenses/>.
 */

//! thermguard - CPU thermal guard for Linux laptops
//!
//! This library samples lm-sensors output, keeps a rolling diagnostic log
//! of recent readings, and escalates through notifications, process
//! termination and session locking when the CPU runs too hot.

pub mod constants;
pub mod config;
pub mod sensors;
pub mod severity;
pub mod retention;
pub mod process;
pub mod mitigation;
pub mod scheduler;
pub mod logging;

pub use tg_error::{Result, ThermguardError};

#[cfg(test)]
pub mod test_utils;
