// Closed-form Black-Scholes pricing and implied-volatility inversion. The
// calibration core only uses these for seeding and reporting; the Heston
// objective never goes through them.

use crate::calibration::types::OptionQuote;
use crate::error::PricingError;
use roots::find_root_brent;

/// Implied volatilities are searched for inside this interval.
pub const IMPLIED_VOL_SEARCH: (f64, f64) = (1e-3, 5.0);

fn norm_cdf(x: f64) -> f64 {
    // 0.5 * [1 + erf(x / sqrt(2))]
    0.5 * (1.0 + libm::erf(x / (2.0_f64).sqrt()))
}

/// Price of a European call option under Black-Scholes assumptions.
#[allow(non_snake_case)]
pub fn bs_call_price(S: f64, K: f64, r: f64, q: f64, T: f64, sigma: f64) -> f64 {
    if T <= 0.0 || sigma <= 0.0 {
        return (S * (-q * T).exp() - K * (-r * T).exp()).max(0.0);
    }
    let (d1, d2) = d1_d2(S, K, r, q, T, sigma);
    S * (-q * T).exp() * norm_cdf(d1) - K * (-r * T).exp() * norm_cdf(d2)
}

/// Price of a European put option under Black-Scholes assumptions.
#[allow(non_snake_case)]
pub fn bs_put_price(S: f64, K: f64, r: f64, q: f64, T: f64, sigma: f64) -> f64 {
    if T <= 0.0 || sigma <= 0.0 {
        return (K * (-r * T).exp() - S * (-q * T).exp()).max(0.0);
    }
    let (d1, d2) = d1_d2(S, K, r, q, T, sigma);
    K * (-r * T).exp() * norm_cdf(-d2) - S * (-q * T).exp() * norm_cdf(-d1)
}

#[allow(non_snake_case)]
fn d1_d2(S: f64, K: f64, r: f64, q: f64, T: f64, sigma: f64) -> (f64, f64) {
    let vol_sqrt_t = sigma * T.sqrt();
    let d1 = ((S / K).ln() + (r - q + 0.5 * sigma * sigma) * T) / vol_sqrt_t;
    (d1, d1 - vol_sqrt_t)
}

/// Black-Scholes price of `quote` at volatility `sigma`.
pub fn black_scholes_price(sigma: f64, quote: &OptionQuote) -> Result<f64, PricingError> {
    if !(sigma > 0.0 && sigma.is_finite()) {
        return Err(PricingError::invalid_parameters(format!(
            "volatility must be > 0 and finite (sigma={})",
            sigma
        )));
    }
    if quote.strike_price <= 0.0 || quote.spot_price <= 0.0 || quote.time_to_maturity <= 0.0 {
        return Err(PricingError::invalid_quote(format!(
            "strike={}, spot={}, t={}",
            quote.strike_price, quote.spot_price, quote.time_to_maturity
        )));
    }
    let pricer = if quote.is_call {
        bs_call_price
    } else {
        bs_put_price
    };
    Ok(pricer(
        quote.spot_price,
        quote.strike_price,
        quote.risk_free_rate,
        quote.dividend_yield,
        quote.time_to_maturity,
        sigma,
    ))
}

/// Black-Scholes implied volatility of the quote's market price.
///
/// Returns `None` when the price lies outside the range spanned by
/// [`IMPLIED_VOL_SEARCH`] (e.g. below intrinsic value).
pub fn implied_volatility(quote: &OptionQuote, tol: f64) -> Option<f64> {
    let (lo, hi) = IMPLIED_VOL_SEARCH;
    let objective = |sigma: f64| -> f64 {
        black_scholes_price(sigma, quote)
            .map(|p| p - quote.market_price)
            .unwrap_or(f64::NAN)
    };

    // Price is monotone in sigma: bracket first so Brent gets a sign change
    let (f_lo, f_hi) = (objective(lo), objective(hi));
    if !(f_lo.is_finite() && f_hi.is_finite()) || f_lo * f_hi > 0.0 {
        return None;
    }

    match find_root_brent(lo, hi, &objective, &mut tol.clone()) {
        Ok(sigma) => Some(sigma),
        Err(e) => {
            tracing::debug!(strike = quote.strike_price, error = ?e, "implied volatility search failed");
            None
        }
    }
}
