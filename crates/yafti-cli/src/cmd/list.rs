use crate::output::{print_json, print_table};
use anyhow::Result;
use std::path::Path;

pub fn run(config_path: Option<&Path>, json: bool) -> Result<i32> {
    let (_, config) = super::load_config(config_path)?;

    if json {
        print_json(&config)?;
        return Ok(0);
    }

    println!("{}", config.title);
    if config.actions().next().is_none() {
        println!("No actions defined.");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = config
        .screens
        .iter()
        .enumerate()
        .flat_map(|(idx, screen)| {
            screen.actions.iter().map(move |a| {
                vec![
                    idx.to_string(),
                    screen.title.clone(),
                    a.id.clone(),
                    a.title.clone(),
                    if a.default { "yes" } else { "" }.to_string(),
                    if a.has_script() { "" } else { "(none)" }.to_string(),
                ]
            })
        })
        .collect();

    println!();
    print_table(&["#", "SCREEN", "ID", "TITLE", "DEFAULT", "SCRIPT"], rows);
    Ok(0)
}
