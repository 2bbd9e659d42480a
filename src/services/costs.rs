//! Cost accounting: pure arithmetic over token and call counts, no I/O.
//! Rounding matches Python's `round()` (half-to-even) rather than Rust's
//! default half-away-from-zero, so recorded costs line up with the
//! figures the billing system was designed against.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobCostFields {
    pub llm_cost_usd: f64,
    pub serper_cost_usd: f64,
    pub total_cost_usd: f64,
    pub cost_per_contact_usd: f64,
}

pub fn llm_cost_usd(prompt_tokens: i64, completion_tokens: i64, input_cost_per_m: f64, output_cost_per_m: f64) -> f64 {
    let pt = prompt_tokens.max(0) as f64;
    let ct = completion_tokens.max(0) as f64;
    (pt / 1_000_000.0) * input_cost_per_m + (ct / 1_000_000.0) * output_cost_per_m
}

pub fn serper_cost_usd(serper_calls: i64, cost_per_1k: f64) -> f64 {
    let sc = serper_calls.max(0) as f64;
    (sc / 1000.0) * cost_per_1k
}

/// Round to 6 decimal places using round-half-to-even, matching Python's
/// `round(x, 6)`. Non-finite inputs round to zero.
pub fn safe_round_money(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    round_half_to_even(v, 6)
}

fn round_half_to_even(v: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = v * factor;
    let floor = scaled.floor();
    let diff = scaled - floor;

    let rounded = if (diff - 0.5).abs() < 1e-9 {
        if (floor as i64) % 2 == 0 { floor } else { floor + 1.0 }
    } else {
        scaled.round()
    };

    rounded / factor
}

pub struct JobCostInputs {
    pub llm_prompt_tokens: i64,
    pub llm_completion_tokens: i64,
    pub serper_calls: i64,
    pub contacts_found: i64,
    pub input_cost_per_m: f64,
    pub output_cost_per_m: f64,
    pub serper_cost_per_1k: f64,
}

pub fn compute_job_cost_fields(inputs: &JobCostInputs) -> JobCostFields {
    let llm =
        llm_cost_usd(inputs.llm_prompt_tokens, inputs.llm_completion_tokens, inputs.input_cost_per_m, inputs.output_cost_per_m);
    let serper = serper_cost_usd(inputs.serper_calls, inputs.serper_cost_per_1k);
    let total = llm + serper;
    let denom = inputs.contacts_found.max(1) as f64;

    JobCostFields {
        llm_cost_usd: safe_round_money(llm),
        serper_cost_usd: safe_round_money(serper),
        total_cost_usd: safe_round_money(total),
        cost_per_contact_usd: safe_round_money(total / denom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_cost_scales_by_million() {
        let cost = llm_cost_usd(1_000_000, 0, 0.15, 0.60);
        assert!((cost - 0.15).abs() < 1e-9);
    }

    #[test]
    fn serper_cost_scales_by_thousand() {
        let cost = serper_cost_usd(1000, 1.0);
        assert!((cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn negative_counts_are_clamped_to_zero() {
        assert_eq!(llm_cost_usd(-5, -5, 1.0, 1.0), 0.0);
        assert_eq!(serper_cost_usd(-1, 1.0), 0.0);
    }

    #[test]
    fn non_finite_rounds_to_zero() {
        assert_eq!(safe_round_money(f64::NAN), 0.0);
        assert_eq!(safe_round_money(f64::INFINITY), 0.0);
    }

    #[test]
    fn cost_per_contact_uses_denominator_floor_of_one() {
        let fields = compute_job_cost_fields(&JobCostInputs {
            llm_prompt_tokens: 0,
            llm_completion_tokens: 0,
            serper_calls: 10,
            contacts_found: 0,
            input_cost_per_m: 0.0,
            output_cost_per_m: 0.0,
            serper_cost_per_1k: 1.0,
        });
        assert_eq!(fields.cost_per_contact_usd, fields.total_cost_usd);
    }
}
