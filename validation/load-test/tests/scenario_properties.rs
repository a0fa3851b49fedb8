//! Properties of the scenario generator over the built-in WMS catalog.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use wms_load_test::wms::{self, MAPSERV_PATH};
use wms_load_test::{
    DomainCatalog, Pacing, ParameterDomain, RequestDescriptor, ScenarioError, ScenarioGenerator,
    ScenarioRule,
};

fn reference_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-10T14:37:12Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn standard() -> ScenarioGenerator {
    wms::standard_generator(reference_time()).unwrap()
}

/// The single-rule profile `P` over `layers = [t2m, mslp]`.
fn layers_profile() -> ScenarioGenerator {
    let mut builder = ScenarioGenerator::builder();
    builder
        .register_domain("layers", ParameterDomain::values(["t2m", "mslp"]))
        .unwrap()
        .register_profile(
            "P",
            vec![ScenarioRule::new("getmap", 10, |draw| {
                Ok(RequestDescriptor::new("getmap", "/cgi-bin/mapserv")
                    .param("LAYERS", draw.pick("layers")?))
            })
            .uses(["layers"])],
            Pacing::between(0.5, 2.0),
        )
        .unwrap();
    builder.build()
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_same_seed_same_sequence() {
    let first = standard();
    let second = standard();

    for profile in first.profile_names() {
        for seed in [0u64, 1, 42, 9_999] {
            let mut rng_a = StdRng::seed_from_u64(seed);
            let mut rng_b = StdRng::seed_from_u64(seed);
            for _ in 0..200 {
                let a = first.next_request(profile, &mut rng_a).unwrap();
                let b = second.next_request(profile, &mut rng_b).unwrap();
                assert_eq!(a, b, "profile {profile} seed {seed} diverged");

                let da = first.next_pacing_delay(profile, &mut rng_a).unwrap();
                let db = second.next_pacing_delay(profile, &mut rng_b).unwrap();
                assert_eq!(da, db);
            }
        }
    }
}

#[test]
fn test_different_seeds_differ() {
    let gen = standard();
    let mut rng_a = StdRng::seed_from_u64(1);
    let mut rng_b = StdRng::seed_from_u64(2);
    let a: Vec<_> = (0..50)
        .map(|_| gen.next_request(wms::AGGRESSIVE, &mut rng_a).unwrap())
        .collect();
    let b: Vec<_> = (0..50)
        .map(|_| gen.next_request(wms::AGGRESSIVE, &mut rng_b).unwrap())
        .collect();
    assert_ne!(a, b);
}

// ============================================================================
// Weight convergence
// ============================================================================

/// Chi-squared critical values at p = 0.001, indexed by degrees of freedom.
const CHI2_CRITICAL: [f64; 6] = [0.0, 10.83, 13.82, 16.27, 18.47, 20.52];

fn chi_squared(observed: &[u64], expected: &[f64]) -> f64 {
    observed
        .iter()
        .zip(expected)
        .map(|(&o, &e)| (o as f64 - e).powi(2) / e)
        .sum()
}

#[test]
fn test_rule_selection_matches_weights() {
    const DRAWS: u64 = 50_000;
    let gen = standard();

    for profile in gen.profiles() {
        let rules = profile.rules();
        let mut observed = vec![0u64; rules.len()];
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..DRAWS {
            let chosen = profile.choose(&mut rng);
            let idx = rules.iter().position(|r| r.name() == chosen.name()).unwrap();
            observed[idx] += 1;
        }

        let expected: Vec<f64> = (0..rules.len())
            .map(|i| profile.probability(i) * DRAWS as f64)
            .collect();
        let stat = chi_squared(&observed, &expected);
        let df = rules.len() - 1;
        assert!(
            stat < CHI2_CRITICAL[df],
            "profile {} chi2 {stat:.2} exceeds {} (observed {observed:?})",
            profile.name(),
            CHI2_CRITICAL[df]
        );
    }
}

#[test]
fn test_request_names_follow_weights() {
    const DRAWS: usize = 20_000;
    let gen = standard();
    let mut rng = StdRng::seed_from_u64(77);

    let mut png = 0u64;
    let mut jpeg = 0u64;
    let mut styled = 0u64;
    for _ in 0..DRAWS {
        let desc = gen.next_request(wms::STYLE_COMPARISON, &mut rng).unwrap();
        match desc.name.as_str() {
            "GetMap [GFS png]" => png += 1,
            "GetMap [GFS jpeg]" => jpeg += 1,
            "GetMap [GFS styled]" => styled += 1,
            other => panic!("unexpected request {other}"),
        }
    }

    // Weights 5 / 5 / 3
    let total = DRAWS as f64;
    let expected = [total * 5.0 / 13.0, total * 5.0 / 13.0, total * 3.0 / 13.0];
    let stat = chi_squared(&[png, jpeg, styled], &expected);
    assert!(stat < CHI2_CRITICAL[2], "chi2 {stat:.2}");
}

// ============================================================================
// Domain membership
// ============================================================================

fn member(catalog: &DomainCatalog, domains: &[&str], value: &str) -> bool {
    domains.iter().any(|d| catalog.contains(d, value))
}

fn assert_in_domains(gen: &ScenarioGenerator, desc: &RequestDescriptor) {
    let catalog = gen.catalog();

    if desc.path != MAPSERV_PATH {
        let rest = desc.path.strip_prefix("/mapcache/").unwrap();
        let parts: Vec<&str> = rest.trim_end_matches(".png").split('/').collect();
        assert!(catalog.contains(wms::TILESETS, parts[0]), "{desc:?}");
        assert!(catalog.contains(wms::ZOOMS, parts[1]), "{desc:?}");
        let z: u32 = parts[1].parse().unwrap();
        for coord in &parts[2..] {
            assert!(coord.parse::<u32>().unwrap() <= wms::max_tile_for_zoom(z));
        }
        return;
    }

    for (key, value) in &desc.query {
        let ok = match key.as_str() {
            "MAP" => member(catalog, &[wms::MAPS], value),
            "SERVICE" => value == "WMS",
            "REQUEST" => value == "GetMap" || value == "GetCapabilities",
            "VERSION" => member(catalog, &[wms::VERSIONS], value),
            "LAYERS" => member(
                catalog,
                &[wms::GFS_LAYERS, wms::MRMS_LAYERS, wms::GOES_LAYERS],
                value,
            ),
            "CRS" | "SRS" => member(catalog, &[wms::CRS], value),
            "BBOX" => member(
                catalog,
                &[wms::BBOX_4326, wms::BBOX_CONUS, wms::BBOX_3857],
                value,
            ),
            "WIDTH" | "HEIGHT" => member(catalog, &[wms::SIZES], value),
            "FORMAT" => member(catalog, &[wms::FORMATS], value),
            "STYLES" => member(catalog, &[wms::STYLES], value),
            "ISOTHERM" => member(catalog, &[wms::ISOTHERMS], value),
            "TIME" | "RUN" => {
                let time = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ")
                    .unwrap()
                    .and_utc();
                let hours = (reference_time() - time).num_hours();
                member(catalog, &[wms::FORECAST_HOURS], &hours.to_string())
            }
            _ => false,
        };
        assert!(ok, "{key}={value} escaped its domain in {desc:?}");
    }
}

#[test]
fn test_values_stay_in_their_domains() {
    let gen = standard();
    let names: Vec<String> = gen.profile_names().map(String::from).collect();

    for profile in &names {
        let mut rng = StdRng::seed_from_u64(31337);
        for _ in 0..2_000 {
            let desc = gen.next_request(profile, &mut rng).unwrap();
            assert_in_domains(&gen, &desc);
        }
    }
}

// ============================================================================
// Construction errors
// ============================================================================

#[test]
fn test_empty_domain_always_fails() {
    for name in ["layers", "sizes", "anything"] {
        let mut builder = ScenarioGenerator::builder();
        let err = builder
            .register_domain(name, ParameterDomain::values(Vec::<String>::new()))
            .unwrap_err();
        assert_eq!(err, ScenarioError::EmptyDomain(name.to_string()));
        assert!(err.is_construction_error());
    }
}

#[test]
fn test_zero_weight_always_fails() {
    let mut builder = ScenarioGenerator::builder();
    builder
        .register_domain("layers", ParameterDomain::values(["t2m"]))
        .unwrap();

    let rules = vec![
        ScenarioRule::new("ok", 3, |_| Ok(RequestDescriptor::new("ok", "/"))),
        ScenarioRule::new("zero", 0, |_| Ok(RequestDescriptor::new("zero", "/"))),
    ];
    assert_eq!(
        builder
            .register_profile("P", rules, Pacing::between(0.0, 1.0))
            .unwrap_err(),
        ScenarioError::InvalidWeight {
            profile: "P".to_string(),
            rule: "zero".to_string(),
            weight: 0,
        }
    );
    assert_eq!(
        builder
            .register_profile("Q", vec![], Pacing::between(0.0, 1.0))
            .unwrap_err(),
        ScenarioError::EmptyRuleSet("Q".to_string())
    );
}

#[test]
fn test_duplicate_domain_fails() {
    let mut builder = wms::standard_builder().unwrap();
    assert_eq!(
        builder
            .register_domain(wms::GFS_LAYERS, ParameterDomain::values(["t2m"]))
            .unwrap_err(),
        ScenarioError::DuplicateDomain(wms::GFS_LAYERS.to_string())
    );
}

// ============================================================================
// Pacing
// ============================================================================

#[test]
fn test_pacing_delay_within_bounds() {
    let gen = standard();
    for profile in gen.profiles() {
        let Pacing { min, max } = profile.pacing();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..10_000 {
            let delay = gen.next_pacing_delay(profile.name(), &mut rng).unwrap();
            assert!(delay >= min && delay <= max, "{} {delay:?}", profile.name());
        }
    }
}

// ============================================================================
// Concrete scenario
// ============================================================================

#[test]
fn test_seed_42_layers_profile() {
    let gen = layers_profile();

    let mut rng = StdRng::seed_from_u64(42);
    let first = gen.next_request("P", &mut rng).unwrap();
    assert_eq!(first.path, "/cgi-bin/mapserv");
    assert_eq!(first.query.len(), 1);
    let layer = first.get("LAYERS").unwrap();
    assert!(layer == "t2m" || layer == "mslp");

    let mut rng = StdRng::seed_from_u64(42);
    assert_eq!(layers_profile().next_request("P", &mut rng).unwrap(), first);

    assert_eq!(
        gen.next_request("unregistered", &mut rng).unwrap_err(),
        ScenarioError::UnknownProfile("unregistered".to_string())
    );
}
