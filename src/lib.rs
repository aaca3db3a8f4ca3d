pub mod about;
pub mod assign;
pub mod assignment_cache;
pub mod assignment_file_parser;
pub mod assignment_store;
pub mod database_file_parser;
pub mod evidence;
pub mod functional_element;
pub mod genome_property;
pub mod logging;
pub mod matches;
pub mod property_tree;
pub mod results;
pub mod settings;
pub mod step;

pub use genprop_protocol::Verdict;
