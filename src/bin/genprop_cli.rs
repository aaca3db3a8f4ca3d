use genprop::{
    about,
    assignment_cache::AssignmentCache,
    assignment_file_parser::{
        load_interproscan_file, load_interproscan_with_sequences, load_longform_file,
        parse_interproscan_matches, protein_fasta_path_for, sample_name_from_path,
    },
    assignment_store::AssignmentStore,
    database_file_parser::load_genome_properties_file,
    logging,
    matches::MatchRecord,
    property_tree::GenomePropertiesTree,
    results::GenomePropertiesResults,
    settings::AssignmentSettings,
    step::StepNumber,
};
use serde::Serialize;
use std::{env, fs, path::PathBuf};

fn usage() {
    eprintln!(
        "Usage:\n  \
  genprop_cli --version\n  \
  genprop_cli [--settings PATH] assign-interproscan CATALOG OUT.json TSV...\n  \
  genprop_cli [--settings PATH] assign-longform CATALOG OUT.json LONGFORM...\n  \
  genprop_cli [--settings PATH] build [--proteins] CATALOG OUT.json TSV...\n  \
  genprop_cli [--settings PATH] merge CATALOG OUT.json STORE.json STORE.json...\n  \
  genprop_cli info STORE.json\n  \
  genprop_cli [--settings PATH] load CATALOG STORE.json OUT.json\n  \
  genprop_cli [--settings PATH] tables CATALOG STORE.json PROPERTIES.csv STEPS.csv\n  \
  genprop_cli [--settings PATH] step-fasta CATALOG STORE.json PROPERTY STEP OUT.fasta [--top]\n  \
  genprop_cli tree CATALOG [--nodes-and-links]\n  \
  genprop_cli metabolism CATALOG OUT.csv\n\n  \
  Log verbosity is read from {}",
        logging::LOG_ENV_VAR
    );
}

/// Expands a leading `~` and `$VAR` components.
fn expand_path(raw: &str) -> PathBuf {
    let mut ret = PathBuf::new();
    for (idx, part) in raw.split('/').enumerate() {
        let expanded = if idx == 0 && part == "~" {
            env::var("HOME").unwrap_or_else(|_| part.to_string())
        } else if let Some(name) = part.strip_prefix('$') {
            env::var(name).unwrap_or_else(|_| part.to_string())
        } else {
            part.to_string()
        };
        if idx == 0 && expanded.is_empty() {
            ret.push("/");
        } else {
            ret.push(expanded);
        }
    }
    ret
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn parse_global_settings_arg(args: &[String]) -> Result<(AssignmentSettings, usize), String> {
    if args.len() >= 3 && args[1] == "--settings" {
        let settings = AssignmentSettings::load_from_path(expand_path(&args[2]))
            .map_err(|e| format!("{e:#}"))?;
        return Ok((settings, 3));
    }
    Ok((AssignmentSettings::default(), 1))
}

fn load_catalog(path: &str) -> Result<GenomePropertiesTree, String> {
    load_genome_properties_file(expand_path(path)).map_err(|e| format!("{e:#}"))
}

fn load_store(path: &str) -> Result<AssignmentStore, String> {
    AssignmentStore::load_from_path(expand_path(path)).map_err(|e| format!("{e:#}"))
}

fn save_results(results: &GenomePropertiesResults<'_>, path: &str) -> Result<(), String> {
    let store = AssignmentStore::from_results(results);
    store
        .save_to_path(expand_path(path))
        .map_err(|e| format!("{e:#}"))?;
    println!(
        "Wrote assignments for {} samples to '{path}'",
        store.samples.len()
    );
    Ok(())
}

/// Positional arguments after the command, with `--flags` removed.
fn positional(args: &[String], start: usize) -> Vec<&str> {
    args[start..]
        .iter()
        .map(|a| a.as_str())
        .filter(|a| !a.starts_with("--"))
        .collect()
}

fn require(values: &[&str], count: usize, command: &str) -> Result<(), String> {
    if values.len() < count {
        usage();
        return Err(format!("Missing arguments for {command}"));
    }
    Ok(())
}

fn load_build_sample(tsv: &str, with_proteins: bool) -> Result<(AssignmentCache, Vec<MatchRecord>), String> {
    let tsv_path = expand_path(tsv);
    if with_proteins {
        let fasta = protein_fasta_path_for(&tsv_path)
            .ok_or_else(|| format!("No .faa or .fasta file next to '{tsv}'"))?;
        return load_interproscan_with_sequences(&tsv_path, &fasta).map_err(|e| format!("{e:#}"));
    }
    let file = fs::File::open(&tsv_path).map_err(|e| format!("Could not open '{tsv}': {e}"))?;
    let records = parse_interproscan_matches(file).map_err(|e| format!("{e:#}"))?;
    let cache = AssignmentCache::with_signatures(
        sample_name_from_path(&tsv_path).as_deref(),
        records.iter().map(|r| r.signature_accession.clone()),
    );
    Ok((cache, records))
}

fn main() {
    logging::init_logging();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (settings, cmd_idx) = parse_global_settings_arg(&args)?;
    if args.len() <= cmd_idx {
        usage();
        return Err("Missing command".to_string());
    }

    let command = args[cmd_idx].as_str();
    let flags: Vec<&str> = args[cmd_idx + 1..]
        .iter()
        .map(|a| a.as_str())
        .filter(|a| a.starts_with("--"))
        .collect();
    let values = positional(&args, cmd_idx + 1);

    match command {
        "assign-interproscan" | "assign-longform" => {
            require(&values, 3, command)?;
            let tree = load_catalog(values[0])?;
            let caches = values[2..]
                .iter()
                .map(|path| {
                    let loaded = if command == "assign-longform" {
                        load_longform_file(expand_path(path))
                    } else {
                        load_interproscan_file(expand_path(path))
                    };
                    loaded.map_err(|e| format!("{e:#}"))
                })
                .collect::<Result<Vec<_>, String>>()?;
            let results =
                GenomePropertiesResults::new(&tree, caches, &settings).map_err(|e| e.to_string())?;
            save_results(&results, values[1])
        }
        "build" => {
            require(&values, 3, command)?;
            let with_proteins = flags.contains(&"--proteins");
            let tree = load_catalog(values[0])?;
            let samples = values[2..]
                .iter()
                .map(|tsv| load_build_sample(tsv, with_proteins))
                .collect::<Result<Vec<_>, String>>()?;
            let results = GenomePropertiesResults::with_matches(&tree, samples, &settings)
                .map_err(|e| e.to_string())?;
            save_results(&results, values[1])
        }
        "merge" => {
            require(&values, 4, command)?;
            let tree = load_catalog(values[0])?;
            let stores = values[2..]
                .iter()
                .map(|path| load_store(path))
                .collect::<Result<Vec<_>, String>>()?;
            let merged = AssignmentStore::merge(stores).map_err(|e| format!("{e:#}"))?;
            let results = merged
                .to_results(&tree, &settings)
                .map_err(|e| format!("{e:#}"))?;
            save_results(&results, values[1])
        }
        "info" => {
            require(&values, 1, command)?;
            let store = load_store(values[0])?;
            println!("{}", store.info());
            Ok(())
        }
        "load" => {
            require(&values, 3, command)?;
            let tree = load_catalog(values[0])?;
            let results = load_store(values[1])?
                .to_results(&tree, &settings)
                .map_err(|e| format!("{e:#}"))?;
            let text = serde_json::to_string_pretty(&results.to_json())
                .map_err(|e| format!("Could not serialize results: {e}"))?;
            fs::write(expand_path(values[2]), text)
                .map_err(|e| format!("Could not write '{}': {e}", values[2]))?;
            println!("Wrote results tree to '{}'", values[2]);
            Ok(())
        }
        "tables" => {
            require(&values, 4, command)?;
            let tree = load_catalog(values[0])?;
            let results = load_store(values[1])?
                .to_results(&tree, &settings)
                .map_err(|e| format!("{e:#}"))?;
            let properties = fs::File::create(expand_path(values[2]))
                .map_err(|e| format!("Could not create '{}': {e}", values[2]))?;
            results
                .write_property_table(properties)
                .map_err(|e| format!("{e:#}"))?;
            let steps = fs::File::create(expand_path(values[3]))
                .map_err(|e| format!("Could not create '{}': {e}", values[3]))?;
            results.write_step_table(steps).map_err(|e| format!("{e:#}"))?;
            println!("Wrote '{}' and '{}'", values[2], values[3]);
            Ok(())
        }
        "step-fasta" => {
            require(&values, 5, command)?;
            let top = settings.top_matches_only || flags.contains(&"--top");
            let tree = load_catalog(values[0])?;
            let results = load_store(values[1])?
                .to_results(&tree, &settings)
                .map_err(|e| format!("{e:#}"))?;
            let step_number: StepNumber = values[3]
                .parse()
                .map_err(|e| format!("Invalid step number '{}': {e}", values[3]))?;
            let out = fs::File::create(expand_path(values[4]))
                .map_err(|e| format!("Could not create '{}': {e}", values[4]))?;
            let written = results
                .write_step_fasta(out, values[2], step_number, top)
                .map_err(|e| format!("{e:#}"))?;
            println!("Wrote {written} proteins to '{}'", values[4]);
            Ok(())
        }
        "tree" => {
            require(&values, 1, command)?;
            let tree = load_catalog(values[0])?;
            if flags.contains(&"--nodes-and-links") {
                print_json(&tree.to_nodes_and_links_json())
            } else {
                print_json(&tree.to_nested_json())
            }
        }
        "metabolism" => {
            require(&values, 2, command)?;
            let tree = load_catalog(values[0])?;
            let out = fs::File::create(expand_path(values[1]))
                .map_err(|e| format!("Could not create '{}': {e}", values[1]))?;
            tree.write_metabolism_mapping(out)
                .map_err(|e| format!("{e:#}"))?;
            Ok(())
        }
        _ => {
            usage();
            Err(format!("Unknown command '{command}'"))
        }
    }
}
