mod test_utils;

use heston_surface::{
    build_volatility_surface, calibrate_heston, calibrate_heston_joint, calibrate_surface,
    optimizer_performance, AnalyticHestonEngine, BoundsPolicy, CalibrationConfig, HestonParameters,
    Optimizer, StageDescriptor,
};
use test_utils::{
    base_quote, create_test_config, reference_params, synthetic_quotes, FailingEngine, StrikeFailingEngine,
};

/// Market price generated from known parameters must be matched by calibration
#[test]
fn test_round_trip_recovers_market_price() {
    let engine = AnalyticHestonEngine::default();
    let quote = synthetic_quotes(&reference_params(), &[100.0], 0.5)[0];
    let initial = HestonParameters::seeded(0.2);

    let result = calibrate_heston(&engine, &quote, &initial, CalibrationConfig::default()).unwrap();

    assert!(result.success, "calibration failed: {:?}", result);
    let objective = result.objective_value.unwrap();
    assert!(objective < 1e-6, "objective {} not below 1e-6", objective);
    let estimated = result.estimated_price.unwrap();
    assert!(
        (estimated - quote.market_price).abs() < 1e-3,
        "estimated price {} vs market {}",
        estimated,
        quote.market_price
    );
    assert!((result.squared_error.unwrap() - (estimated - quote.market_price).powi(2)).abs() < 1e-15);
}

/// Same quote and guess must pick the same stage and parameters every time
#[test]
fn test_fallback_ordering_is_deterministic() {
    let engine = AnalyticHestonEngine::default();
    let quote = synthetic_quotes(&reference_params(), &[105.0], 0.25)[0];
    let initial = HestonParameters::seeded(0.2);

    let first = calibrate_heston(&engine, &quote, &initial, create_test_config()).unwrap();
    for _ in 0..3 {
        let again = calibrate_heston(&engine, &quote, &initial, create_test_config()).unwrap();
        assert_eq!(again.optimizer_used, first.optimizer_used);
        assert_eq!(again.params, first.params, "repeated calibration drifted");
    }
}

/// Every successful result lies inside the configured box, theta window included
#[test]
fn test_bounds_respected() {
    let engine = AnalyticHestonEngine::default();
    let quotes = synthetic_quotes(&reference_params(), &[85.0, 100.0, 120.0], 1.0);
    let initial = HestonParameters::seeded(0.25);
    let config = create_test_config();
    let bounds = BoundsPolicy::default().bounds_for(&initial);

    let results = calibrate_surface(&engine, &quotes, &initial, config).unwrap();

    for result in results.iter().filter(|r| r.success) {
        let params = result.params.unwrap();
        assert!(bounds.contains(&params), "{:?} outside {:?}", params, bounds);
        assert!(params.theta >= 0.5 * initial.theta && params.theta <= 1.5 * initial.theta);
    }
}

/// Three strikes priced from known parameters all calibrate and report 100% success
#[test]
fn test_end_to_end_three_strikes() {
    let engine = AnalyticHestonEngine::default();
    let quotes = synthetic_quotes(&reference_params(), &[95.0, 100.0, 105.0], 0.25);
    let initial = HestonParameters::seeded(0.2);

    let results = calibrate_surface(&engine, &quotes, &initial, create_test_config()).unwrap();
    assert_eq!(results.len(), 3);
    for (result, quote) in results.iter().zip(&quotes) {
        assert!(result.success, "strike {} failed", quote.strike_price);
        assert_eq!(result.strike, quote.strike_price, "results must keep input order");
    }

    let performance = optimizer_performance(&results);
    assert_eq!(performance.failures, 0);
    assert_eq!(performance.overall_success_rate(), 100.0);
    let total_rate: f64 = performance.stages.iter().map(|s| s.success_rate).sum();
    assert!((total_rate - 100.0).abs() < 1e-9, "stage rates sum to {}", total_rate);

    if results.iter().all(|r| r.optimizer_used == results[0].optimizer_used) {
        let stage = performance.get(results[0].optimizer_used).unwrap();
        assert_eq!(stage.success_rate, 100.0);
        assert_eq!(stage.successes, 3);
    }

    let surface = build_volatility_surface(&results);
    assert_eq!(surface.len(), 3);
    assert!(surface.failed_strikes().is_empty());
}

/// A quote no stage can fit still produces a zero-filled row at its strike
#[test]
fn test_total_failure_row_integrity() {
    let quotes = vec![base_quote(95.0, 0.25).with_market_price(6.0), base_quote(100.0, 0.25).with_market_price(3.5)];
    let initial = HestonParameters::seeded(0.2);

    let results = calibrate_surface(&FailingEngine, &quotes, &initial, create_test_config()).unwrap();

    assert_eq!(results.len(), quotes.len());
    for result in &results {
        assert!(!result.success);
        assert_eq!(result.optimizer_used, Optimizer::Exhausted);
        assert!(result.params.is_none() && result.objective_value.is_none());
    }

    let surface = build_volatility_surface(&results);
    assert_eq!(surface.len(), quotes.len(), "row count in must equal row count out");
    assert_eq!(surface.failed_strikes(), vec![95.0, 100.0]);
    for row in surface.rows() {
        assert!(!row.calibrated);
        assert_eq!((row.v0, row.kappa, row.theta, row.sigma, row.rho), (0.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(row.expected_variance, 0.0);
    }
    assert!(surface.to_points().is_empty());
}

/// One unpriceable strike fails alone without disturbing its neighbours
#[test]
fn test_partial_failure_keeps_other_rows() {
    let quotes = synthetic_quotes(&reference_params(), &[95.0, 100.0, 105.0], 0.25);
    let engine = StrikeFailingEngine {
        failing_strike: 100.0,
        inner: AnalyticHestonEngine::default(),
    };

    let results = calibrate_surface(&engine, &quotes, &HestonParameters::seeded(0.2), create_test_config()).unwrap();

    assert!(results[0].success && results[2].success);
    assert!(!results[1].success);
    let surface = build_volatility_surface(&results);
    assert_eq!(surface.failed_strikes(), vec![100.0]);
    assert_eq!(surface.to_points().len(), 2);

    let performance = optimizer_performance(&results);
    assert_eq!(performance.failures, 1);
}

/// A chain made of the non-quasi-Newton stages still calibrates
#[test]
fn test_alternative_chain_stages() {
    let engine = AnalyticHestonEngine::default();
    let quote = synthetic_quotes(&reference_params(), &[100.0], 0.5)[0];
    let config = CalibrationConfig {
        stages: vec![
            StageDescriptor::new(Optimizer::ProjectedGradient, true, 2000),
            StageDescriptor::new(Optimizer::Sqp, true, 1000),
            StageDescriptor::new(Optimizer::NelderMead, false, 10000),
        ],
        ..create_test_config()
    };

    let result = calibrate_heston(&engine, &quote, &HestonParameters::seeded(0.2), config).unwrap();

    assert!(result.success, "{:?}", result);
    assert_ne!(result.optimizer_used, Optimizer::LBfgsB);
    assert!(result.squared_error.unwrap() < 1e-4, "squared error {:?}", result.squared_error);
}

/// Joint fit of one parameter vector across several strikes
#[test]
fn test_joint_calibration() {
    let engine = AnalyticHestonEngine::default();
    let quotes = synthetic_quotes(&reference_params(), &[90.0, 100.0, 110.0], 0.5);

    let batch = calibrate_heston_joint(&engine, &quotes, &HestonParameters::seeded(0.2), create_test_config()).unwrap();

    assert!(batch.success);
    assert_eq!(batch.results.len(), 3);
    let objective = batch.objective_value.unwrap();
    let summed: f64 = batch.results.iter().map(|r| r.squared_error.unwrap()).sum();
    assert!((objective - summed).abs() < 1e-9, "batch objective {} vs per-quote sum {}", objective, summed);
    assert!(objective < 1e-3, "joint objective {}", objective);
    let params = batch.params.unwrap();
    assert!(batch.results.iter().all(|r| r.params == Some(params)));
}

/// Malformed input is rejected before any optimisation starts
#[test]
fn test_input_validation() {
    let engine = AnalyticHestonEngine::default();
    let initial = HestonParameters::seeded(0.2);

    let err = calibrate_surface(&engine, &[], &initial, create_test_config()).unwrap_err();
    assert!(err.to_string().contains("no option quotes"));

    let mut bad = base_quote(100.0, 0.25).with_market_price(4.0);
    bad.time_to_maturity = 0.0;
    let quotes = vec![base_quote(95.0, 0.25).with_market_price(6.0), bad];
    let err = calibrate_surface(&engine, &quotes, &initial, create_test_config()).unwrap_err();
    assert!(format!("{:#}", err).contains("quote #1"), "{:#}", err);

    let zero_theta = HestonParameters {
        theta: 0.0,
        ..initial
    };
    assert!(calibrate_heston(&engine, &quotes[0], &zero_theta, create_test_config()).is_err());

    let empty_chain = CalibrationConfig {
        stages: vec![],
        ..create_test_config()
    };
    assert!(calibrate_heston(&engine, &quotes[0], &initial, empty_chain).is_err());
}
