//! Core of LuminaCal: local storage for meals, water, weight, custom foods and
//! scans; health calculations; backups; and the food-scan session.

pub mod backup;
pub mod db;
pub mod health;
pub mod migrations;
pub mod models;
pub mod scan;
pub mod service;
