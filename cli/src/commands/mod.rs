mod export;
mod food;
mod helpers;
mod import;
mod meal;
mod profile;
mod scan;
mod summary;
mod water;
mod weight;

pub(crate) use export::{ExportFormat, cmd_export};
pub(crate) use food::{
    cmd_food_add, cmd_food_delete, cmd_food_favorite, cmd_food_list, cmd_food_use,
};
pub(crate) use import::cmd_import;
pub(crate) use meal::{MealInput, cmd_meal_clear, cmd_meal_delete, cmd_meal_list, cmd_meal_log};
pub(crate) use profile::{ProfileUpdate, cmd_profile_set, cmd_profile_show};
pub(crate) use scan::{ScanConfirmation, cmd_scan_clear, cmd_scan_confirm, cmd_scan_history};
pub(crate) use summary::{cmd_history, cmd_summary};
pub(crate) use water::{cmd_water_add, cmd_water_clear, cmd_water_show};
pub(crate) use weight::{cmd_weight_delete, cmd_weight_history, cmd_weight_log};
