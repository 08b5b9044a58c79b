// Example: calibrate_surface.rs
// Calibrates the Heston model quote by quote and prints the resulting
// expected-variance surface together with the optimizer performance table.
//
// Usage:
//     cargo run --example calibrate_surface -- [csv_path] [initial_vol]
//
// Without a CSV path the demo prices a synthetic chain from known Heston
// parameters. The CSV needs the columns spot_price, strike_price, market_price,
// time_to_maturity, risk_free_rate, dividend_yield and option_type.

use std::env;
use std::error::Error;

use csv::ReaderBuilder;
use heston_surface::{
    build_volatility_surface, calibrate_surface, default_configs, optimizer_performance, AnalyticHestonEngine,
    HestonParameters, OptionQuote, PricingEngine,
};

// ---------------------------------------------------------------------------
// CSV deserialization helpers
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct CsvRow {
    spot_price: f64,
    strike_price: f64,
    market_price: f64,
    time_to_maturity: f64,
    risk_free_rate: f64,
    dividend_yield: f64,
    option_type: String,
}

impl From<CsvRow> for OptionQuote {
    fn from(r: CsvRow) -> Self {
        OptionQuote {
            spot_price: r.spot_price,
            strike_price: r.strike_price,
            market_price: r.market_price,
            time_to_maturity: r.time_to_maturity,
            risk_free_rate: r.risk_free_rate,
            dividend_yield: r.dividend_yield,
            is_call: r.option_type.eq_ignore_ascii_case("call"),
        }
    }
}

fn load_csv(path: &str) -> Result<Vec<OptionQuote>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut quotes = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvRow = result?;
        quotes.push(row.into());
    }
    Ok(quotes)
}

fn synthetic_chain(engine: &AnalyticHestonEngine) -> Result<Vec<OptionQuote>, Box<dyn Error>> {
    let truth = HestonParameters::new(0.04, 1.5, 0.05, 0.4, -0.6)?;
    let mut quotes = Vec::new();
    for &t in &[0.25, 0.5, 1.0] {
        for &strike in &[85.0, 90.0, 95.0, 100.0, 105.0, 110.0, 115.0] {
            let quote = OptionQuote {
                spot_price: 100.0,
                strike_price: strike,
                market_price: 0.0,
                time_to_maturity: t,
                risk_free_rate: 0.03,
                dividend_yield: 0.0,
                is_call: strike >= 100.0,
            };
            let price = engine.price(&truth, &quote)?;
            quotes.push(quote.with_market_price(price));
        }
    }
    Ok(quotes)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let engine = AnalyticHestonEngine::default();

    let quotes = match args.get(1) {
        Some(path) => load_csv(path)?,
        None => synthetic_chain(&engine)?,
    };
    let initial_vol: f64 = args.get(2).map(|s| s.parse::<f64>()).transpose()?.unwrap_or(0.2);
    println!("Loaded {} quotes, seeding from {:.1}% volatility", quotes.len(), initial_vol * 100.0);

    let initial = HestonParameters::seeded(initial_vol);
    let results = calibrate_surface(&engine, &quotes, &initial, default_configs::fast())?;

    let surface = build_volatility_surface(&results);
    println!("\nStrike | T | v0 | kappa | theta | sigma | rho | Model | Market | E[vol]%");
    for (row, vol) in surface.rows().iter().zip(surface.volatilities()) {
        println!(
            "{:.1} | {:.3} | {:.5} | {:.4} | {:.5} | {:.4} | {:.4} | {:.4} | {:.4} | {:.2}",
            row.strike,
            row.time_to_maturity,
            row.v0,
            row.kappa,
            row.theta,
            row.sigma,
            row.rho,
            row.theoretical_price,
            row.market_price,
            vol * 100.0
        );
    }

    let failed = surface.failed_strikes();
    if !failed.is_empty() {
        println!("\nFailed strikes: {:?}", failed);
    }

    println!("\n{}", optimizer_performance(&results));
    Ok(())
}
