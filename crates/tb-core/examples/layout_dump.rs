use std::env;
use std::fs;
use std::process::ExitCode;
use tb_core::side::{Worksheet, project_side};
use tb_core::{BuilderConfig, EditMode, TreeMode, compute_layout, parse_tree, project};

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: layout_dump <tree.json> [btree|binary|multiway] [edit mode]");
        return ExitCode::FAILURE;
    };
    let mode = match args.get(2).map(|m| (m, TreeMode::parse(m))) {
        None => TreeMode::BTree,
        Some((_, Some(mode))) => mode,
        Some((name, None)) => {
            log::warn!("unknown tree mode: {name}");
            return ExitCode::FAILURE;
        }
    };
    let edit = match args.get(3).map(|m| (m, EditMode::parse(m))) {
        None => EditMode::Builder,
        Some((_, Some(edit))) => edit,
        Some((name, None)) => {
            log::warn!("unknown edit mode: {name}");
            return ExitCode::FAILURE;
        }
    };
    let config = BuilderConfig::new(mode, edit);

    let input = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("SKIP {path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let tree = match parse_tree(&input, config.tree_mode) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("FAIL {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let geometry = config.geometry();
    let layout = compute_layout(&tree, &config, &geometry);
    let render = project(&tree, &layout, &config, &geometry);

    println!(
        "{} node(s), {} row(s) at {:.1}px{}",
        tree.len(),
        layout.row_count,
        layout.row_height,
        if layout.ceiling_hit() { ", sublayer ceiling hit" } else { "" }
    );
    for node in &render.nodes {
        let depth = layout.get(node.id).map_or(0, |p| p.depth);
        println!(
            "{:indent$}{} [{}] at ({:.1}, {:.1})",
            "",
            node.id,
            node.text.join(", "),
            node.x,
            node.y,
            indent = depth * 2
        );
    }
    println!("{} affordance(s)", render.affordances.len());
    let side = project_side(&Worksheet::new(&config.start_side_tree), &layout, &config, &geometry);
    if !side.is_empty() {
        println!("{} worksheet cell(s)", side.cells.len());
    }
    ExitCode::SUCCESS
}
