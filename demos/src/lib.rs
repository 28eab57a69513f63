//! A ready-made load test for a job board backend (a Supabase-style REST API),
//! built on `horde`.
//!
//! [`roles`] declares the four user roles and their tasks; [`cli`] turns flags and an
//! optional YAML file into a [`horde::RunConfig`].
pub mod cli;
pub mod roles;
