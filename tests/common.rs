use gumdrop::Options;
use httpmock::MockServer;
use std::sync::Arc;
use url::Url;

use campus_load::prelude::*;

/// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
/// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --users 1
///  --hatch-rate 1
///  --run-time 1
#[allow(dead_code)]
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> Configuration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to testing with 1 user if not otherwise configured.
    if !configuration.contains(&"--users") {
        configuration.extend_from_slice(&["--users", "1"]);
    }

    // Default to hatch 1 user per second if not otherwise configured.
    if !configuration.contains(&"--hatch-rate") {
        configuration.extend_from_slice(&["--hatch-rate", "1"]);
    }

    // Default to running for 1 second if not otherwise configured.
    if !configuration.contains(&"--run-time") {
        configuration.extend_from_slice(&["--run-time", "1"]);
    }

    // Parse these options to generate a Configuration.
    Configuration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// A stand-alone user sending every request to the mock server, sharing `registries`.
#[allow(dead_code)]
pub fn build_user(server: &MockServer, registries: &Arc<Registries>) -> VirtualUser {
    let base_url = Url::parse(&server.base_url()).expect("mock server url");
    VirtualUser::single(base_url, Arc::clone(registries)).expect("failed to build user")
}

/// A user sending course requests to `courses` and everything else to `people`.
#[allow(dead_code)]
pub fn build_split_user(
    courses: &MockServer,
    people: &MockServer,
    registries: &Arc<Registries>,
) -> VirtualUser {
    let courses_url = Url::parse(&courses.base_url()).expect("courses mock server url");
    let people_url = Url::parse(&people.base_url()).expect("people mock server url");
    let hosts = Hosts {
        courses: courses_url,
        students: people_url.clone(),
        instructors: people_url,
    };
    VirtualUser::new(
        1,
        0,
        hosts,
        Arc::clone(registries),
        &Configuration::default(),
    )
    .expect("failed to build user")
}

/// Ids `prefix1` through `prefixN`.
#[allow(dead_code)]
pub fn ids(prefix: &str, count: usize) -> Vec<EntityId> {
    (1..=count)
        .map(|i| EntityId::from(format!("{}{}", prefix, i).as_str()))
        .collect()
}
