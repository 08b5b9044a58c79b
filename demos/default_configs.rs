use heston_surface::{
    calibrate_heston, default_configs, AnalyticHestonEngine, CalibrationConfig, HestonParameters, OptionQuote,
};

fn print_chain(config: &CalibrationConfig) {
    for stage in &config.stages {
        println!(
            "   - {} ({}, max {} iterations)",
            stage.optimizer,
            if stage.bounded { "bounded" } else { "unbounded" },
            stage.max_iterations
        );
    }
}

fn main() {
    // At-the-money call, three months out
    let quote = OptionQuote {
        spot_price: 100.0,
        strike_price: 100.0,
        market_price: 4.35,
        time_to_maturity: 0.25,
        risk_free_rate: 0.03,
        dividend_yield: 0.0,
        is_call: true,
    };

    println!("Heston-surface Default Configuration Examples\n");

    // 1. Fast configuration for development
    println!("1. Fast Configuration (good for development):");
    let fast_config = default_configs::fast();
    print_chain(&fast_config);
    println!("   Tolerance: {:.1e}", fast_config.tolerance);
    println!("   Basin-hopping iterations: {}", fast_config.global.iterations);
    println!("   Use case: Development, quick prototyping\n");

    // 2. Production configuration
    println!("2. Production Configuration:");
    let prod_config = default_configs::production();
    print_chain(&prod_config);
    println!("   Tolerance: {:.1e}", prod_config.tolerance);
    println!("   Parallel over quotes: {}", prod_config.parallel);
    println!("   Use case: Daily surface builds\n");

    // 3. Research configuration
    println!("3. Research Configuration (maximum accuracy):");
    let research_config = default_configs::research();
    print_chain(&research_config);
    println!("   Tolerance: {:.1e}", research_config.tolerance);
    println!("   CMA-ES BIPOP restarts: {}", research_config.global.bipop_restarts);
    println!(
        "   CMA-ES evaluation budget: {}",
        research_config.global.total_evals_budget
    );
    println!("   Use case: Academic research, backtesting\n");

    // 4. Minimal configuration
    println!("4. Minimal Configuration (quick validation):");
    let minimal_config = default_configs::minimal();
    print_chain(&minimal_config);
    println!("   Tolerance: {:.1e}", minimal_config.tolerance);
    println!("   Use case: Quick checks, debugging\n");

    // Example calibration using fast config
    println!("Running example calibration with fast config...");
    let engine = AnalyticHestonEngine::default();
    match calibrate_heston(&engine, &quote, &HestonParameters::seeded(0.2), fast_config) {
        Ok(result) if result.success => {
            println!("✅ Calibration successful with {}!", result.optimizer_used);
            println!("   Objective: {:.3e}", result.objective_value.unwrap_or(f64::NAN));
            println!("   Parameters: {:?}", result.params);
        }
        Ok(result) => {
            println!("❌ Every stage failed for strike {}", result.strike);
        }
        Err(e) => {
            println!("❌ Calibration rejected: {}", e);
        }
    }
}
