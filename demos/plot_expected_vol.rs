// Example: plot_expected_vol.rs
// Calibrates a synthetic two-maturity chain and plots the expected volatility
// sqrt(E[v_t]) implied by each fitted parameter set against strike, one line
// per maturity. Black-Scholes implied vols of the market prices are drawn as
// dots for comparison.
//
// Usage:
//     cargo run --example plot_expected_vol
//
// The output image will be written to expected_vol.svg in the working directory.

use std::error::Error;

use plotters::prelude::*;
use heston_surface::{
    build_volatility_surface, calibrate_surface, default_configs, implied_volatility, AnalyticHestonEngine,
    HestonParameters, OptionQuote, PricingEngine,
};

const MATURITIES: [f64; 2] = [0.25, 1.0];

fn main() -> Result<(), Box<dyn Error>> {
    let engine = AnalyticHestonEngine::default();
    let truth = HestonParameters::new(0.06, 2.0, 0.04, 0.5, -0.7)?;

    let mut quotes = Vec::new();
    for &t in &MATURITIES {
        for i in 0..=12 {
            let strike = 80.0 + 3.5 * i as f64;
            let quote = OptionQuote {
                spot_price: 100.0,
                strike_price: strike,
                market_price: 0.0,
                time_to_maturity: t,
                risk_free_rate: 0.02,
                dividend_yield: 0.0,
                is_call: strike >= 100.0,
            };
            quotes.push(quote.with_market_price(engine.price(&truth, &quote)?));
        }
    }

    let results = calibrate_surface(&engine, &quotes, &HestonParameters::seeded(0.22), default_configs::fast())?;
    let surface = build_volatility_surface(&results);

    // Market implied vols in percent, keyed by maturity
    let market_points: Vec<(f64, f64, f64)> = quotes
        .iter()
        .filter_map(|q| implied_volatility(q, 1e-10).map(|iv| (q.time_to_maturity, q.strike_price, iv * 100.0)))
        .collect();

    let model_lines: Vec<Vec<(f64, f64)>> = MATURITIES
        .iter()
        .map(|&t| {
            surface
                .rows()
                .iter()
                .filter(|row| row.calibrated && row.time_to_maturity == t)
                .map(|row| (row.strike, row.volatility() * 100.0))
                .collect()
        })
        .collect();

    let all_vols = market_points
        .iter()
        .map(|p| p.2)
        .chain(model_lines.iter().flatten().map(|p| p.1));
    let (min_vol, max_vol) = all_vols.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min_vol.is_finite() {
        return Err("nothing to plot".into());
    }
    let padding = ((max_vol - min_vol) * 0.1).max(0.5);

    let root = SVGBackend::new("expected_vol.svg", (1280, 768)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Heston expected volatility vs market implied vol", ("sans-serif", 30))
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(78.0..124.0, (min_vol - padding).max(0.0)..max_vol + padding)?;

    chart
        .configure_mesh()
        .x_desc("Strike")
        .y_desc("Volatility (%)")
        .draw()?;

    let colors = [RED, BLUE];
    for ((&t, line), color) in MATURITIES.iter().zip(model_lines).zip(colors) {
        chart
            .draw_series(LineSeries::new(line, color.stroke_width(2)))?
            .label(format!("sqrt(E[v_t]) t={}", t))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

        chart.draw_series(
            market_points
                .iter()
                .filter(|p| p.0 == t)
                .map(|p| Circle::new((p.1, p.2), 3, color.filled())),
        )?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    println!("Calibrated {} quotes ({} failed)", surface.len(), surface.failed_strikes().len());
    println!("Chart saved to expected_vol.svg");
    Ok(())
}
