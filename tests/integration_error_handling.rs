//! Integration tests for error handling and invalid input scenarios

use lppl_finance::{
    evaluate, run_windows, search, BoundsConfig, FitConfig, LpplError, NestedFitConfig,
    ObservationSeries, ParameterVector, SearchConfig,
};

fn flat_series(n: usize) -> ObservationSeries {
    let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let prices: Vec<f64> = times.iter().map(|t| 1.0 + 0.001 * t).collect();
    ObservationSeries::new(times, prices).unwrap()
}

/// Test scenario: evaluating at or beyond the critical time is a domain error
#[test]
fn test_domain_error_at_critical_time() {
    for &tc in &[10.0, 738_900.5] {
        for &m in &[0.01, 0.5, 0.99] {
            let p = ParameterVector {
                tc,
                m,
                w: 6.0,
                a: 0.0,
                b: 1.0,
                c1: 0.5,
                c2: -0.5,
            };
            match evaluate(tc, &p) {
                Err(LpplError::DomainError { t, tc: critical }) => {
                    assert_eq!(t, tc);
                    assert_eq!(critical, tc);
                }
                other => panic!("Expected DomainError, got {:?}", other),
            }
        }
    }
}

/// Test scenario: malformed price data is rejected up front
#[test]
fn test_invalid_observations_rejected() {
    let times = vec![1.0, 2.0, 3.0, 3.0, 4.0, 5.0];
    assert!(matches!(
        ObservationSeries::new(times, vec![0.0; 6]),
        Err(LpplError::InvalidObservations { .. })
    ));

    let times: Vec<f64> = (0..6).map(|i| i as f64).collect();
    let prices = vec![1.0, 2.0, f64::INFINITY, 4.0, 5.0, 6.0];
    match ObservationSeries::new(times, prices) {
        Err(LpplError::NumericalError { reason }) => {
            assert!(reason.contains("log_prices"));
            assert!(reason.contains("index 2"));
        }
        other => panic!("Expected NumericalError, got {:?}", other),
    }
}

/// Test scenario: invalid configurations fail before any fitting
#[test]
fn test_invalid_configuration_rejected() {
    let observations = flat_series(100);

    let config = NestedFitConfig {
        window_size: 20,
        smallest_window_size: 30,
        ..Default::default()
    };
    assert!(matches!(
        run_windows(&observations, &config),
        Err(LpplError::InvalidParameter { .. })
    ));

    let bounds = BoundsConfig {
        m_range: (0.5, 1.5),
        ..Default::default()
    };
    assert!(matches!(
        search(
            &observations,
            &bounds,
            &SearchConfig::seeded(5, 1),
            &FitConfig::default()
        ),
        Err(LpplError::InvalidParameter { .. })
    ));

    let short = NestedFitConfig::default();
    assert!(matches!(
        run_windows(&flat_series(40), &short),
        Err(LpplError::InsufficientData { .. })
    ));
}

/// Test scenario: a search whose every attempt fails reports it instead of guessing
#[test]
fn test_exhausted_search_reports_no_convergence() {
    let observations = flat_series(50);
    let hopeless = FitConfig {
        max_iterations: 1,
        gradient_tolerance: 1e-300,
        cost_tolerance: 1e-300,
        step_tolerance: 1e-300,
        ..FitConfig::default()
    };

    let result = search(
        &observations,
        &BoundsConfig::default(),
        &SearchConfig::seeded(4, 8),
        &hopeless,
    );
    match result {
        Err(LpplError::NoConvergence { attempts }) => assert_eq!(attempts, 4),
        other => panic!("Expected NoConvergence, got {:?}", other),
    }
}
