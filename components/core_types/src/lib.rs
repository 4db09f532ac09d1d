//! Core types shared by the optimizing compiler.
//!
//! This crate provides the read-only collaborator data an inlining pass
//! consumes: identifiers, method and class descriptors, and profiling tables.
//!
//! # Overview
//!
//! - [`MethodId`], [`ClassId`], [`KnownObjectId`] - Runtime handles
//! - [`CallSiteKey`] - Stable location of a call instruction
//! - [`MethodInfo`], [`ClassInfo`] - Loader-provided descriptors
//! - [`ProfileData`] - Receiver and fan-in histograms
//!
//! # Examples
//!
//! ```
//! use core_types::{CallSiteKey, ClassId, MethodId, ProfileData, ProfileOracle};
//!
//! let mut profile = ProfileData::new();
//! let site = CallSiteKey::new(MethodId(1), 4);
//! profile.record_receiver(site, ClassId(2), 90);
//! profile.record_receiver(site, ClassId(3), 10);
//!
//! let hist = profile.receiver_histogram(site).unwrap();
//! assert_eq!(hist.sorted()[0].0, ClassId(2));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod ids;
mod method;
mod profile;

pub use ids::{CallSiteKey, ClassId, KnownObjectId, MethodId};
pub use method::{ClassInfo, Hotness, MethodFlags, MethodInfo, ValueType};
pub use profile::{FanInHistogram, ProfileData, ProfileOracle, ReceiverHistogram};
