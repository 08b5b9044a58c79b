mod test_utils;

use approx::assert_relative_eq;
use heston_surface::{
    build_volatility_surface, calibrate_surface, expected_variance, initial_guess_from_quote, optimizer_performance,
    AnalyticHestonEngine, CalibrationResult, HestonParameters, Optimizer,
};
use test_utils::{base_quote, create_test_config, load_quotes};

const FIXTURE: &str = "tests/data/synthetic_quotes.csv";

/// Fixture quotes load and satisfy their domain constraints
#[test]
fn test_fixture_loads() {
    let quotes = load_quotes(FIXTURE).expect("Failed to load test data");
    assert_eq!(quotes.len(), 14);
    assert!(quotes.iter().all(|q| q.validate().is_ok()));
    assert_eq!(quotes.iter().filter(|q| !q.is_call).count(), 6);
}

/// Calibrate every fixture quote from its own implied-volatility seed and build the surface
#[test]
fn test_surface_from_fixture() {
    let engine = AnalyticHestonEngine::default();
    let quotes = load_quotes(FIXTURE).expect("Failed to load test data");

    let mut results: Vec<CalibrationResult> = Vec::new();
    for quote in &quotes {
        let initial = initial_guess_from_quote(quote).expect("fixture prices admit an implied vol");
        let mut batch = calibrate_surface(&engine, std::slice::from_ref(quote), &initial, create_test_config())
            .expect("valid input");
        results.append(&mut batch);
    }

    let performance = optimizer_performance(&results);
    println!("{}", performance);
    assert_eq!(performance.failures, 0, "every fixture quote should calibrate");

    let surface = build_volatility_surface(&results);
    assert_eq!(surface.len(), quotes.len());

    let rows = surface.rows();
    for pair in rows.windows(2) {
        assert!(pair[0].strike <= pair[1].strike, "rows must be sorted by strike");
        if pair[0].strike == pair[1].strike {
            assert!(pair[0].time_to_maturity <= pair[1].time_to_maturity);
        }
    }

    for (row, vol) in rows.iter().zip(surface.volatilities()) {
        assert!(row.calibrated);
        assert!(vol > 0.0 && vol < 1.0, "vol {} at strike {}", vol, row.strike);
        assert_relative_eq!(vol * vol, row.expected_variance, max_relative = 1e-12);
        assert!(
            (row.theoretical_price - row.market_price).abs() < 1e-2,
            "strike {} t {}: model {} vs market {}",
            row.strike,
            row.time_to_maturity,
            row.theoretical_price,
            row.market_price
        );
    }

    let points = surface.to_points();
    assert_eq!(points.len(), rows.len());
    for point in &points {
        assert_relative_eq!(
            point.expected_variance,
            point.model_params.expected_variance(point.time_to_maturity),
            max_relative = 1e-12
        );
    }
}

/// Expected variance starts at v0 and decays to theta
#[test]
fn test_expected_variance_asymptotics() {
    let params = HestonParameters::new(0.09, 1.5, 0.04, 0.3, -0.5).unwrap();
    assert_relative_eq!(params.expected_variance(0.0), params.v0, epsilon = 1e-15);
    assert_relative_eq!(params.expected_variance(50.0), params.theta, max_relative = 1e-12);
    assert_relative_eq!(expected_variance(0.02, 2.0, 0.05, 0.5), 0.05 - 0.03 * (-1.0_f64).exp(), epsilon = 1e-15);
}

/// Rows of mixed maturities at one strike keep a deterministic order
#[test]
fn test_ordering_by_strike_then_maturity() {
    let params = HestonParameters::seeded(0.2);
    let result = |strike: f64, t: f64| {
        let quote = base_quote(strike, t).with_market_price(1.0);
        CalibrationResult::succeeded(&quote, params, Optimizer::LBfgsB, 0.0, 1.0)
    };
    let results = vec![result(100.0, 1.0), result(90.0, 0.5), result(100.0, 0.25), result(90.0, 0.25)];

    let surface = build_volatility_surface(&results);
    let keys: Vec<(f64, f64)> = surface.rows().iter().map(|r| (r.strike, r.time_to_maturity)).collect();
    assert_eq!(keys, vec![(90.0, 0.25), (90.0, 0.5), (100.0, 0.25), (100.0, 1.0)]);
}
