//! `colors` subcommand: the accepted state vocabulary.

use super::{ColorsOutput, NamedColorJson, Result, led, print_json};

pub(super) fn cmd_colors(json: bool) -> Result<()> {
    if json {
        return print_json(&ColorsOutput {
            colors: led::NAMED_COLORS
                .iter()
                .map(|&(name, rgb)| NamedColorJson {
                    name,
                    hex: led::format_color(rgb),
                })
                .collect(),
            scenes: led::Scene::ALL.iter().map(|s| s.as_str()).collect(),
            speeds: led::Speed::ALL.iter().map(|s| s.as_str()).collect(),
        });
    }

    println!("Colours:");
    for &(name, rgb) in led::NAMED_COLORS {
        println!("  {name:<12}{}", led::format_color(rgb));
    }
    println!();
    println!("Scenes:");
    for scene in led::Scene::ALL {
        println!("  {scene}");
    }
    println!();
    println!(
        "Speeds:   {}",
        led::Speed::ALL.map(|s| s.as_str()).join(", ")
    );
    println!("Also:     on, off, #RRGGBB, r,g,b");
    Ok(())
}
