//! Body-metric formulas: BMI, Mifflin-St Jeor BMR, TDEE, calorie targets,
//! macro split and time-to-goal. Everything here is pure.

use serde::Serialize;

use crate::models::{ActivityLevel, FitnessGoal, Gender, HealthMetrics};

/// Calorie targets never go below this, whatever the goal.
pub const MIN_TARGET_CALORIES: i64 = 1200;

/// Energy in one kilogram of body fat.
pub const KCAL_PER_KG: f64 = 7700.0;

const PROTEIN_SHARE: f64 = 0.30;
const CARBS_SHARE: f64 = 0.40;
const FAT_SHARE: f64 = 0.30;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    #[must_use]
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            Self::Underweight
        } else if bmi < 25.0 {
            Self::Normal
        } else if bmi < 30.0 {
            Self::Overweight
        } else {
            Self::Obese
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Underweight => "Underweight",
            Self::Normal => "Normal",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
        }
    }
}

impl Gender {
    /// Constant term of the Mifflin-St Jeor equation.
    #[must_use]
    pub fn bmr_offset(self) -> f64 {
        match self {
            Gender::Male => 5.0,
            Gender::Female => -161.0,
            Gender::Other => -78.0,
        }
    }
}

impl ActivityLevel {
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::ExtraActive => 1.9,
        }
    }
}

impl FitnessGoal {
    /// kcal/day added to TDEE.
    #[must_use]
    pub fn daily_adjustment(self) -> i64 {
        match self {
            FitnessGoal::Lose => -500,
            FitnessGoal::Maintain => 0,
            FitnessGoal::Gain => 300,
        }
    }
}

/// kg / m². Zero when the height is not positive.
#[must_use]
pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    if height_cm <= 0.0 {
        return 0.0;
    }
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bmr(weight_kg: f64, height_cm: f64, age: i64, gender: Gender) -> f64 {
    10.0 * weight_kg + 6.25 * height_cm - 5.0 * age as f64 + gender.bmr_offset()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroTargets {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

impl MacroTargets {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn for_calories(calories: i64) -> Self {
        let kcal = calories as f64;
        Self {
            protein_g: kcal * PROTEIN_SHARE / KCAL_PER_G_PROTEIN,
            carbs_g: kcal * CARBS_SHARE / KCAL_PER_G_CARBS,
            fat_g: kcal * FAT_SHARE / KCAL_PER_G_FAT,
        }
    }

    /// Energy the split adds back up to.
    #[must_use]
    pub fn calories(&self) -> f64 {
        self.protein_g * KCAL_PER_G_PROTEIN
            + self.carbs_g * KCAL_PER_G_CARBS
            + self.fat_g * KCAL_PER_G_FAT
    }
}

/// Every derived number for a profile, in one serializable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub bmi: f64,
    pub bmi_category: BmiCategory,
    pub bmr: i64,
    pub tdee: i64,
    pub target_calories: i64,
    pub macros: MacroTargets,
    pub weeks_to_goal: Option<f64>,
    pub water_target_ml: i64,
}

impl HealthMetrics {
    #[must_use]
    pub fn bmi(&self) -> f64 {
        bmi(self.weight_kg, self.height_cm)
    }

    #[must_use]
    pub fn bmi_category(&self) -> BmiCategory {
        BmiCategory::from_bmi(self.bmi())
    }

    #[must_use]
    pub fn bmr(&self) -> f64 {
        bmr(self.weight_kg, self.height_cm, self.age, self.gender)
    }

    #[must_use]
    pub fn tdee(&self) -> f64 {
        self.bmr() * self.activity_level.multiplier()
    }

    /// BMR in whole kcal (truncated).
    #[must_use]
    pub fn bmr_kcal(&self) -> i64 {
        self.bmr() as i64
    }

    /// Truncated BMR times the activity multiplier, truncated again.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tdee_kcal(&self) -> i64 {
        (self.bmr_kcal() as f64 * self.activity_level.multiplier()) as i64
    }

    #[must_use]
    pub fn target_calories(&self) -> i64 {
        (self.tdee_kcal() + self.fitness_goal.daily_adjustment()).max(MIN_TARGET_CALORIES)
    }

    #[must_use]
    pub fn macro_targets(&self) -> MacroTargets {
        MacroTargets::for_calories(self.target_calories())
    }

    /// Weeks until the target weight at the goal's daily deficit or surplus.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn weeks_to_goal(&self) -> Option<f64> {
        let target = self.target_weight_kg?;
        let adjustment = self.fitness_goal.daily_adjustment();
        if adjustment == 0 {
            return None;
        }
        let weekly_kcal = (adjustment.abs() * 7) as f64;
        Some((target - self.weight_kg).abs() * KCAL_PER_KG / weekly_kcal)
    }

    #[must_use]
    pub fn report(&self) -> HealthReport {
        HealthReport {
            bmi: self.bmi(),
            bmi_category: self.bmi_category(),
            bmr: self.bmr_kcal(),
            tdee: self.tdee_kcal(),
            target_calories: self.target_calories(),
            macros: self.macro_targets(),
            weeks_to_goal: self.weeks_to_goal(),
            water_target_ml: self.water_target_ml,
        }
    }
}
