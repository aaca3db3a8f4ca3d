pub const GENPROP_DISPLAY_VERSION: &str = env!("GENPROP_DISPLAY_VERSION");
pub const GENPROP_BUILD_N: &str = env!("GENPROP_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "genprop {}\nBuild {}\nGenome properties assignment engine",
        GENPROP_DISPLAY_VERSION, GENPROP_BUILD_N
    )
}
