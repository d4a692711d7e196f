use clap::Subcommand;
use comfy_table::{presets::UTF8_FULL, Table};
use gachapon_core::shipping::{
    custom_box, grams_to_lbs, select_box, standard_boxes, validate_parcel,
};
use gachapon_core::{ProtocolConfig, Result};

#[derive(Subcommand)]
pub enum ShippingCommands {
    /// Pick the box and billable weight for an item
    Estimate {
        /// Item length in inches
        length_in: f64,
        /// Item width in inches
        width_in: f64,
        /// Item height in inches
        height_in: f64,
        /// Item weight in grams
        weight_grams: u32,
    },
    /// Check an item against carrier acceptance limits
    Validate {
        /// Item length in inches
        length_in: f64,
        /// Item width in inches
        width_in: f64,
        /// Item height in inches
        height_in: f64,
        /// Item weight in grams
        weight_grams: u32,
    },
    /// List the stocked box catalog
    Boxes,
}

pub fn handle_shipping_command(cmd: ShippingCommands, config: &ProtocolConfig) -> Result<()> {
    match cmd {
        ShippingCommands::Estimate {
            length_in,
            width_in,
            height_in,
            weight_grams,
        } => {
            let weight_lbs = grams_to_lbs(weight_grams);
            let selection = select_box(length_in, width_in, height_in, weight_lbs, config.dim_divisor);

            println!(
                "Box: {}{}",
                selection.box_spec.name,
                if selection.is_custom {
                    " (built to order)"
                } else {
                    ""
                }
            );
            println!(
                "  Inner dimensions: {:.0}x{:.0}x{:.0}in",
                selection.box_spec.length_in,
                selection.box_spec.width_in,
                selection.box_spec.height_in
            );
            println!("  Actual weight: {:.2} lbs", selection.actual_weight_lbs);
            println!(
                "  Dimensional weight: {:.2} lbs (divisor {})",
                selection.dim_weight_lbs, config.dim_divisor
            );
            println!("  Billable weight: {:.1} lbs", selection.billable_weight_lbs);
            if selection.requires_additional_handling {
                println!("  Additional handling surcharge applies.");
            }

            let violations = validate_parcel(length_in, width_in, height_in, weight_lbs);
            for violation in violations {
                println!("  Warning: {}", violation);
            }
        }

        ShippingCommands::Validate {
            length_in,
            width_in,
            height_in,
            weight_grams,
        } => {
            let weight_lbs = grams_to_lbs(weight_grams);
            let violations = validate_parcel(length_in, width_in, height_in, weight_lbs);
            if violations.is_empty() {
                println!(
                    "Shippable: {:.0}x{:.0}x{:.0}in at {:.2} lbs is within carrier limits.",
                    length_in, width_in, height_in, weight_lbs
                );
            } else {
                println!("Not shippable:");
                for violation in violations {
                    println!("  - {}", violation);
                }
            }
        }

        ShippingCommands::Boxes => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Name", "Dimensions", "Max weight"]);
            for spec in standard_boxes() {
                table.add_row(vec![
                    spec.name.clone(),
                    format!("{:.0}x{:.0}x{:.0}in", spec.length_in, spec.width_in, spec.height_in),
                    format!("{:.0} lbs", spec.max_weight_lbs),
                ]);
            }
            let custom = custom_box();
            table.add_row(vec![
                format!("{} (fallback)", custom.name),
                format!(
                    "up to {:.0}x{:.0}x{:.0}in",
                    custom.length_in, custom.width_in, custom.height_in
                ),
                format!("{:.0} lbs", custom.max_weight_lbs),
            ]);
            println!("{}", table);
        }
    }

    Ok(())
}
