//! End-to-end tests: HTTP router, real pipeline, real subprocess engine
//! (a shell script standing in for Blender) and a mock remote server.

#![cfg(unix)]

mod helpers;

mod convert_test;
mod health_test;
mod manifest_test;
