use anyhow::{Result, bail};

use luminacal_core::models::{ActivityLevel, FitnessGoal, Gender, HealthMetrics};
use luminacal_core::service::LuminaService;

use super::helpers::report_validation;

/// Fields to change; anything left `None` keeps its stored value.
#[derive(Default)]
pub(crate) struct ProfileUpdate {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub activity: Option<String>,
    pub goal: Option<String>,
    pub target_weight_kg: Option<f64>,
    pub clear_target_weight: bool,
    pub water_target_ml: Option<i64>,
}

impl ProfileUpdate {
    fn is_empty(&self) -> bool {
        self.weight_kg.is_none()
            && self.height_cm.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.activity.is_none()
            && self.goal.is_none()
            && self.target_weight_kg.is_none()
            && !self.clear_target_weight
            && self.water_target_ml.is_none()
    }

    pub(crate) fn apply(self, current: HealthMetrics) -> Result<HealthMetrics> {
        Ok(HealthMetrics {
            weight_kg: self.weight_kg.unwrap_or(current.weight_kg),
            height_cm: self.height_cm.unwrap_or(current.height_cm),
            age: self.age.unwrap_or(current.age),
            gender: self
                .gender
                .map(|g| g.parse::<Gender>())
                .transpose()?
                .unwrap_or(current.gender),
            activity_level: self
                .activity
                .map(|a| a.parse::<ActivityLevel>())
                .transpose()?
                .unwrap_or(current.activity_level),
            fitness_goal: self
                .goal
                .map(|g| g.parse::<FitnessGoal>())
                .transpose()?
                .unwrap_or(current.fitness_goal),
            target_weight_kg: if self.clear_target_weight {
                None
            } else {
                self.target_weight_kg.or(current.target_weight_kg)
            },
            water_target_ml: self.water_target_ml.unwrap_or(current.water_target_ml),
        })
    }
}

pub(crate) fn cmd_profile_set(svc: &LuminaService, update: ProfileUpdate, json: bool) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to update. Provide at least one of --weight, --height, --age, --gender, --activity, --goal, --target-weight, --water-target");
    }
    let metrics = update.apply(svc.db().health_metrics()?)?;
    let (saved, warnings) = svc.update_health_metrics(&metrics)?;
    for warning in &warnings {
        report_validation("profile", warning);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "metrics": saved,
                "report": saved.report(),
            }))?
        );
    } else {
        println!("Profile updated. Daily target: {} kcal", saved.target_calories());
    }
    Ok(())
}

pub(crate) fn cmd_profile_show(svc: &LuminaService, json: bool) -> Result<()> {
    let metrics = svc.db().health_metrics()?;
    let report = metrics.report();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "metrics": metrics,
                "report": report,
            }))?
        );
        return Ok(());
    }

    println!("=== Profile ===\n");
    println!(
        "  {:.1} kg, {:.0} cm, {} y, {}",
        metrics.weight_kg, metrics.height_cm, metrics.age, metrics.gender
    );
    println!(
        "  Activity: {}  Goal: {}",
        metrics.activity_level, metrics.fitness_goal
    );
    if let Some(target) = metrics.target_weight_kg {
        println!("  Target weight: {target:.1} kg");
    }
    println!();
    println!("  BMI: {:.1} ({})", report.bmi, report.bmi_category.label());
    println!("  BMR: {} kcal", report.bmr);
    println!("  TDEE: {} kcal", report.tdee);
    println!("  TARGET: {} kcal", report.target_calories);
    println!(
        "  MACROS: P:{:.0}g C:{:.0}g F:{:.0}g",
        report.macros.protein_g, report.macros.carbs_g, report.macros.fat_g
    );
    if let Some(weeks) = report.weeks_to_goal {
        println!("  Goal in ~{weeks:.1} weeks");
    }
    println!("  Water: {} ml/day", report.water_target_ml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unset_fields() {
        let current = HealthMetrics {
            target_weight_kg: Some(65.0),
            ..HealthMetrics::default()
        };
        let update = ProfileUpdate {
            weight_kg: Some(72.0),
            gender: Some("Female".to_string()),
            activity: Some("extra_active".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
        let merged = update.apply(current.clone()).unwrap();
        assert!((merged.weight_kg - 72.0).abs() < f64::EPSILON);
        assert_eq!(merged.gender, Gender::Female);
        assert_eq!(merged.activity_level, ActivityLevel::ExtraActive);
        assert_eq!(merged.fitness_goal, FitnessGoal::Maintain);
        assert_eq!(merged.target_weight_kg, Some(65.0));
        assert!((merged.height_cm - current.height_cm).abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_clears_target_and_rejects_bad_enum() {
        let current = HealthMetrics {
            target_weight_kg: Some(65.0),
            ..HealthMetrics::default()
        };
        let cleared = ProfileUpdate {
            clear_target_weight: true,
            ..ProfileUpdate::default()
        }
        .apply(current.clone())
        .unwrap();
        assert!(cleared.target_weight_kg.is_none());

        let bad = ProfileUpdate {
            goal: Some("bulk".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(bad.apply(current).is_err());
        assert!(ProfileUpdate::default().is_empty());
    }
}
