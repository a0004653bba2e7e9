//! Road-freight carbon-tax model.
//!
//! A monthly model of how a carbon tax on diesel reaches freight prices, demand,
//! fleet fuel efficiency and the carbon intensity of fuel, and whether carriers stay
//! viable. Money is in yuan, activity in tonne-km, time in months.
use crate::error::Result;
use crate::model::Model;
use crate::store::{Formula, Registry};

/// Policy lever of the model.
pub const CARBON_TAX_RATE: &str = "carbon_tax_rate";
/// 1 while carriers remain viable, 0 otherwise.
pub const VIABILITY_FLAG: &str = "viability_flag";
pub const CUMULATIVE_CO2: &str = "cumulative_co2";
pub const CUMULATIVE_PROFIT: &str = "cumulative_profit";
pub const ROLLING_MARGIN: &str = "rolling_margin";

/// Builds the registry with the calibrated default parameters.
pub fn registry() -> Result<Registry> {
    let mut reg = Registry::new();
    parameters(&mut reg)?;
    prices(&mut reg)?;
    demand(&mut reg)?;
    technology(&mut reg)?;
    finances(&mut reg)?;
    Ok(reg)
}

/// The registry, resolved and ready to run.
pub fn model() -> Result<Model> {
    Model::build(registry()?)
}

fn parameters(reg: &mut Registry) -> Result<()> {
    const CONSTANTS: &[(&str, f64, &str)] = &[
        (CARBON_TAX_RATE, 289.0, "¥/tCO2"),
        ("tax_scale", 3000.0, "¥/tCO2"),
        ("baseline_margin", 0.05, "fraction"),
        ("baseline_ci", 0.00268, "tCO2/liter"),
        ("baseline_demand", 19.0e9, "tkm/month"),
        ("baseline_fuel_efficiency", 2.84, "km/liter"),
        ("carbon_content_of_fuel", 0.00268, "tCO2/liter"),
        ("cost_pressure_at_max_improvement", 1.0, "dmnl"),
        ("cost_pressure_sensitivity", 0.2, "dmnl"),
        ("degradation_rate", 0.0, "1/month"),
        ("desired_passthrough_share", 0.5, "fraction"),
        ("duration_threshold", 6.0, "months"),
        ("elasticity_lr", -0.6, "dmnl"),
        ("elasticity_sr", -0.2, "dmnl"),
        ("freight_activity_growth_rate", 0.0, "1/month"),
        ("margin_threshold", 0.02, "fraction"),
        ("max_efficiency", 1.25, "dmnl"),
        ("max_reduction_ci", 0.45, "fraction"),
        ("nonfuel_cost_per_km", 90.0, "¥/km"),
        ("pretax_fuel_price", 108.0, "¥/liter"),
        ("tau_ci", 120.0, "months"),
        ("tau_eff", 36.0, "months"),
        ("tau_lr", 24.0, "months"),
        ("tau_m", 12.0, "months"),
        ("tau_p", 6.0, "months"),
        ("tau_sr", 3.0, "months"),
    ];
    for &(name, value, unit) in CONSTANTS {
        reg.constant(name, value)?;
        reg.set_unit(name, unit)?;
    }
    Ok(())
}

fn prices(reg: &mut Registry) -> Result<()> {
    reg.auxiliary(
        "tax_per_liter",
        Formula::new(&[CARBON_TAX_RATE, "carbon_content_of_fuel"], |x| x[0] * x[1]),
    )?;
    reg.set_unit("tax_per_liter", "¥/liter")?;
    reg.auxiliary("fuel_price", Formula::new(&["pretax_fuel_price", "tax_per_liter"], |x| x[0] + x[1]))?;
    reg.set_unit("fuel_price", "¥/liter")?;
    reg.auxiliary(
        "fuel_cost_per_km",
        Formula::new(&["fuel_price", "average_fuel_efficiency"], |x| x[0] / x[1]),
    )?;
    reg.auxiliary(
        "baseline_fuel_cost_per_km",
        Formula::new(&["pretax_fuel_price", "baseline_fuel_efficiency"], |x| x[0] / x[1]),
    )?;
    reg.set_unit("baseline_fuel_cost_per_km", "¥/km")?;
    reg.auxiliary(
        "extra_fuel_cost_per_km",
        Formula::new(&["fuel_cost_per_km", "baseline_fuel_cost_per_km"], |x| x[0] - x[1]),
    )?;
    reg.auxiliary(
        "baseline_operating_cost_per_km",
        Formula::new(&["nonfuel_cost_per_km", "baseline_fuel_cost_per_km"], |x| x[0] + x[1]),
    )?;
    reg.auxiliary(
        "baseline_margin_per_km",
        Formula::new(&["baseline_margin", "baseline_operating_cost_per_km"], |x| x[0] * x[1]),
    )?;
    reg.auxiliary(
        "baseline_freight_price",
        Formula::new(&["baseline_operating_cost_per_km", "baseline_margin_per_km"], |x| x[0] + x[1]),
    )?;
    reg.set_unit("baseline_freight_price", "¥/tkm")?;

    // Carriers pass a growing share of the extra fuel cost on to shippers.
    reg.smoother(
        "effective_passthrough_share",
        Formula::identity("desired_passthrough_share"),
        Formula::identity("tau_p"),
        Formula::identity("desired_passthrough_share"),
    )?;
    reg.auxiliary(
        "actual_freight_price",
        Formula::new(
            &["baseline_freight_price", "effective_passthrough_share", "extra_fuel_cost_per_km"],
            |x| x[0] + x[1] * x[2],
        ),
    )?;
    reg.smoother(
        "perceived_freight_price",
        Formula::identity("actual_freight_price"),
        Formula::identity("tau_p"),
        Formula::identity("actual_freight_price"),
    )?;
    Ok(())
}

/// Demand change implied by the perceived price under a constant-elasticity response.
fn price_effect(elasticity: &str) -> Formula {
    Formula::new(
        &["underlying_freight_activity", "perceived_freight_price", "baseline_freight_price", elasticity],
        |x| x[0] * (x[1] / x[2]).powf(x[3]) - x[0],
    )
}

fn demand(reg: &mut Registry) -> Result<()> {
    reg.stock(
        "underlying_freight_activity",
        Formula::new(&["freight_activity_growth_rate", "underlying_freight_activity"], |x| x[0] * x[1]),
        Formula::identity("baseline_demand"),
    )?;
    reg.set_unit("underlying_freight_activity", "tkm/month")?;
    reg.smoother(
        "shortrun_price_effect_on_demand",
        price_effect("elasticity_sr"),
        Formula::identity("tau_sr"),
        price_effect("elasticity_sr"),
    )?;
    reg.smoother(
        "longrun_price_effect_on_demand",
        price_effect("elasticity_lr"),
        Formula::identity("tau_lr"),
        price_effect("elasticity_lr"),
    )?;
    reg.auxiliary(
        "freight_demand",
        Formula::new(
            &["underlying_freight_activity", "shortrun_price_effect_on_demand", "longrun_price_effect_on_demand"],
            |x| x[0] + x[1] + x[2],
        ),
    )?;
    reg.set_unit("freight_demand", "tkm/month")?;
    reg.auxiliary("freight_activity", Formula::identity("freight_demand"))?;
    reg.set_unit("freight_activity", "tkm/month")?;
    Ok(())
}

fn technology(reg: &mut Registry) -> Result<()> {
    reg.auxiliary(
        "cost_pressure_on_efficiency",
        Formula::new(
            &["cost_pressure_sensitivity", "fuel_cost_per_km", "baseline_fuel_cost_per_km"],
            |x| x[0] * (x[1] / x[2] - 1.0),
        ),
    )?;
    reg.auxiliary(
        "efficiency_target",
        Formula::new(
            &[
                "average_fuel_efficiency",
                "max_efficiency",
                "cost_pressure_on_efficiency",
                "cost_pressure_at_max_improvement",
            ],
            |x| {
                let (current, max, pressure, saturation) = (x[0], x[1], x[2], x[3]);
                let pressured = current * (1.0 + (max - 1.0) * (pressure / (pressure + saturation)));
                (current * max).min(pressured)
            },
        ),
    )?;
    reg.set_unit("efficiency_target", "km/liter")?;
    reg.auxiliary(
        "improvement",
        Formula::new(&["efficiency_target", "average_fuel_efficiency", "tau_eff"], |x| (x[0] - x[1]) / x[2]),
    )?;
    reg.auxiliary(
        "degradation",
        Formula::new(&["average_fuel_efficiency", "degradation_rate"], |x| x[0] * x[1]),
    )?;
    reg.stock(
        "average_fuel_efficiency",
        Formula::new(&["improvement", "degradation"], |x| x[0] - x[1]),
        Formula::identity("baseline_fuel_efficiency"),
    )?;
    reg.set_unit("average_fuel_efficiency", "km/liter")?;

    reg.auxiliary(
        "target_carbon_intensity",
        Formula::new(&["baseline_ci", "max_reduction_ci", CARBON_TAX_RATE, "tax_scale"], |x| {
            x[0] * (1.0 - x[1] * (1.0 - (-x[2] / x[3]).exp()))
        }),
    )?;
    reg.set_unit("target_carbon_intensity", "tCO2/liter")?;
    reg.auxiliary(
        "ci_adjustment",
        Formula::new(&["target_carbon_intensity", "carbon_intensity_of_fuel", "tau_ci"], |x| {
            (x[0] - x[1]) / x[2]
        }),
    )?;
    reg.stock("carbon_intensity_of_fuel", Formula::identity("ci_adjustment"), Formula::identity("baseline_ci"))?;
    reg.set_unit("carbon_intensity_of_fuel", "tCO2/liter")?;

    reg.auxiliary(
        "fuel_consumption",
        Formula::new(&["freight_activity", "average_fuel_efficiency"], |x| x[0] / x[1]),
    )?;
    reg.auxiliary(
        "emissions",
        Formula::new(&["fuel_consumption", "carbon_intensity_of_fuel"], |x| x[0] * x[1]),
    )?;
    reg.set_unit("emissions", "tCO2/month")?;
    reg.stock(CUMULATIVE_CO2, Formula::identity("emissions"), Formula::constant(0.0))?;
    reg.set_unit(CUMULATIVE_CO2, "tCO2")?;
    Ok(())
}

fn finances(reg: &mut Registry) -> Result<()> {
    reg.auxiliary(
        "operating_cost_per_km",
        Formula::new(&["nonfuel_cost_per_km", "fuel_cost_per_km"], |x| x[0] + x[1]),
    )?;
    reg.auxiliary(
        "operating_expenses",
        Formula::new(&["freight_activity", "operating_cost_per_km"], |x| x[0] * x[1]),
    )?;
    reg.auxiliary(
        "revenue",
        Formula::new(&["freight_activity", "perceived_freight_price"], |x| x[0] * x[1]),
    )?;
    reg.auxiliary("profit", Formula::new(&["revenue", "operating_expenses"], |x| x[0] - x[1]))?;
    reg.auxiliary("margin", Formula::new(&["profit", "revenue"], |x| x[0] / x[1]))?;
    reg.set_unit("margin", "fraction")?;
    reg.smoother(
        ROLLING_MARGIN,
        Formula::identity("margin"),
        Formula::identity("tau_m"),
        Formula::identity("margin"),
    )?;
    reg.stock(CUMULATIVE_PROFIT, Formula::identity("profit"), Formula::constant(0.0))?;
    reg.stock(
        "duration_below_margin_threshold",
        Formula::new(&[ROLLING_MARGIN, "margin_threshold"], |x| if x[0] < x[1] { 1.0 } else { 0.0 }),
        Formula::constant(0.0),
    )?;
    reg.set_unit("duration_below_margin_threshold", "months")?;
    reg.auxiliary(
        VIABILITY_FLAG,
        Formula::new(
            &["duration_below_margin_threshold", "duration_threshold", CUMULATIVE_PROFIT],
            |x| if x[0] > x[1] || x[2] < 0.0 { 0.0 } else { 1.0 },
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, RunRequest, SimulationConfig};
    use crate::store::NodeKind;

    #[test]
    fn test_registry_shape() {
        let reg = registry().unwrap();
        let stateful = reg.kinds.iter().filter(|k| k.is_stateful()).count();
        let smoothers = reg.kinds.iter().filter(|&&k| k == NodeKind::Smoother).count();
        assert_eq!(stateful, 11);
        assert_eq!(smoothers, 5);
        assert!(reg.count() > 50);
    }

    #[test]
    fn test_initial_state_is_baseline() {
        let model = model().unwrap();
        let mut stepper = model.stepper(SimulationConfig::default()).unwrap();
        stepper.step(1, &Overrides::from([(CARBON_TAX_RATE.to_string(), 0.0)])).unwrap();

        assert_eq!(stepper.read("average_fuel_efficiency").unwrap(), 2.84);
        assert_eq!(stepper.read("carbon_intensity_of_fuel").unwrap(), 0.00268);
        assert_eq!(stepper.read(CUMULATIVE_CO2).unwrap(), 0.0);
        // No tax: prices sit at baseline and demand is unchanged.
        let base = stepper.read("baseline_freight_price").unwrap();
        assert!((stepper.read("perceived_freight_price").unwrap() - base).abs() < 1e-9);
        assert!((stepper.read("freight_demand").unwrap() - 19.0e9).abs() < 1e-3);
        // Margin is profit over revenue, so a 5% markup on cost is 0.05 / 1.05.
        assert!((stepper.read(ROLLING_MARGIN).unwrap() - 0.05 / 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_higher_tax_lowers_emissions() {
        let model = model().unwrap();
        let run = |tax: f64| {
            let request = RunRequest::new(Overrides::from([(CARBON_TAX_RATE.to_string(), tax)]), &[CUMULATIVE_CO2])
                .with_config(SimulationConfig::until(60.0));
            model.run(&request).unwrap().last(CUMULATIVE_CO2).unwrap()
        };
        let low = run(100.0);
        let high = run(2000.0);
        assert!(low > 0.0);
        assert!(high < low);
    }

    #[test]
    fn test_default_tax_stays_viable() {
        let table = model().unwrap().run_with(Overrides::new(), &[VIABILITY_FLAG]).unwrap();
        assert_eq!(table.len(), 121);
        assert!(table.column(VIABILITY_FLAG).unwrap().iter().all(|&v| v == 1.0));
    }
}
