//! Shorthands for the engine's initialization steps and scheduling phases.

/// Evaluate `$body` and log how long the named network step took. Yields
/// the body's value, so a fallible step can be followed by `?`.
///
/// ```text
/// timed_step!("negotiate_dimensions", { self.negotiate_dimensions() })?;
/// ```
#[macro_export]
macro_rules! timed_step {
    ($step:expr, $body:block) => {{
        let started = std::time::Instant::now();
        let value = $body;
        tracing::debug!(
            step = $step,
            duration_us = started.elapsed().as_micros() as u64,
            "network_step_complete"
        );
        value
    }};
}

/// Mark the end of a scheduling phase. Nothing is emitted unless
/// performance tracing is on.
///
/// ```text
/// phase_event!(phase, regions = members.len());
/// ```
#[macro_export]
macro_rules! phase_event {
    ($phase:expr $(, $field:ident = $value:expr)*) => {
        if $crate::performance::enabled() {
            tracing::debug!(phase = $phase, $($field = $value,)* "phase_complete");
        }
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn timed_step_yields_the_value() {
        let sum = timed_step!("sum", { (1..=10).sum::<u32>() });
        assert_eq!(sum, 55);

        let failed = timed_step!("fallible", { "x".parse::<u8>() });
        assert!(failed.is_err());
    }

    #[test]
    fn phase_event_expands() {
        phase_event!(1usize);
        phase_event!(2usize, regions = 4usize, iteration = 7u64);
    }
}
