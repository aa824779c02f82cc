//! Version 1 of the email job API.

pub mod routes;
