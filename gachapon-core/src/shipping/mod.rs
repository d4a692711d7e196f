//! Package selection and billable-weight math for prize shipments.
//!
//! Everything here is pure; the redemption service feeds it prize
//! dimensions and passes the result to the label provider.

use serde::{Deserialize, Serialize};

/// Pounds per 453.59237 grams, exactly.
pub const GRAMS_PER_LB: f64 = 453.59237;

/// Longest side limit before a parcel is unshippable (inches).
const MAX_SIDE_IN: f64 = 108.0;
/// Length-plus-girth limit (inches).
const MAX_LENGTH_GIRTH_IN: f64 = 165.0;
/// Carrier weight ceiling (pounds).
const MAX_WEIGHT_LBS: f64 = 150.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxSpec {
    pub name: String,
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
    pub max_weight_lbs: f64,
}

impl BoxSpec {
    fn new(name: &str, length_in: f64, width_in: f64, height_in: f64, max_weight_lbs: f64) -> Self {
        Self {
            name: name.to_string(),
            length_in,
            width_in,
            height_in,
            max_weight_lbs,
        }
    }

    pub fn volume(&self) -> f64 {
        self.length_in * self.width_in * self.height_in
    }

    fn sorted_dims(&self) -> [f64; 3] {
        sort_desc([self.length_in, self.width_in, self.height_in])
    }
}

/// The stocked box sizes, smallest first. The custom box is not listed
/// here; it is the fallback when nothing below fits.
pub fn standard_boxes() -> Vec<BoxSpec> {
    vec![
        BoxSpec::new("small", 8.0, 6.0, 4.0, 20.0),
        BoxSpec::new("medium", 12.0, 10.0, 6.0, 40.0),
        BoxSpec::new("large", 16.0, 12.0, 8.0, 50.0),
        BoxSpec::new("xl", 20.0, 16.0, 12.0, 65.0),
        BoxSpec::new("xxl", 24.0, 20.0, 16.0, 70.0),
    ]
}

/// Built-to-order packaging at carrier limits.
pub fn custom_box() -> BoxSpec {
    BoxSpec::new("custom", 96.0, 48.0, 48.0, MAX_WEIGHT_LBS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxSelection {
    pub box_spec: BoxSpec,
    pub is_custom: bool,
    pub requires_additional_handling: bool,
    pub actual_weight_lbs: f64,
    pub dim_weight_lbs: f64,
    /// max(actual, dim) rounded up to the next tenth of a pound.
    pub billable_weight_lbs: f64,
}

/// Pick the smallest stocked box an item fits, falling back to a custom
/// box. Dimensions are compared sorted, so orientation never matters.
pub fn select_box(
    length_in: f64,
    width_in: f64,
    height_in: f64,
    weight_lbs: f64,
    dim_divisor: f64,
) -> BoxSelection {
    let dims = sort_desc([length_in, width_in, height_in]);

    let dim_weight_lbs = dims[0] * dims[1] * dims[2] / dim_divisor;
    let billable_weight_lbs = round_up_tenth(weight_lbs.max(dim_weight_lbs));

    // Carriers surcharge long or wide or heavy parcels regardless of box.
    let requires_additional_handling = dims[0] > 48.0 || dims[1] > 30.0 || weight_lbs > 50.0;

    let mut catalog = standard_boxes();
    catalog.sort_by(|a, b| a.volume().total_cmp(&b.volume()));

    for candidate in catalog {
        let box_dims = candidate.sorted_dims();
        let fits_dims = dims
            .iter()
            .zip(box_dims.iter())
            .all(|(item, boxed)| item <= boxed);
        if fits_dims && weight_lbs <= candidate.max_weight_lbs {
            return BoxSelection {
                box_spec: candidate,
                is_custom: false,
                requires_additional_handling,
                actual_weight_lbs: weight_lbs,
                dim_weight_lbs,
                billable_weight_lbs,
            };
        }
    }

    BoxSelection {
        box_spec: custom_box(),
        is_custom: true,
        requires_additional_handling,
        actual_weight_lbs: weight_lbs,
        dim_weight_lbs,
        billable_weight_lbs,
    }
}

/// Carrier acceptance check. Returns human-readable violations rather
/// than failing, so callers can show all problems at once.
pub fn validate_parcel(
    length_in: f64,
    width_in: f64,
    height_in: f64,
    weight_lbs: f64,
) -> Vec<String> {
    let dims = sort_desc([length_in, width_in, height_in]);
    let mut violations = Vec::new();

    if dims[0] > MAX_SIDE_IN {
        violations.push(format!(
            "longest side {:.1}in exceeds {:.0}in limit",
            dims[0], MAX_SIDE_IN
        ));
    }

    let length_plus_girth = dims[0] + 2.0 * (dims[1] + dims[2]);
    if length_plus_girth > MAX_LENGTH_GIRTH_IN {
        violations.push(format!(
            "length plus girth {:.1}in exceeds {:.0}in limit",
            length_plus_girth, MAX_LENGTH_GIRTH_IN
        ));
    }

    if weight_lbs > MAX_WEIGHT_LBS {
        violations.push(format!(
            "weight {:.1}lbs exceeds {:.0}lbs limit",
            weight_lbs, MAX_WEIGHT_LBS
        ));
    }

    violations
}

pub fn grams_to_lbs(grams: u32) -> f64 {
    grams as f64 / GRAMS_PER_LB
}

fn sort_desc(mut dims: [f64; 3]) -> [f64; 3] {
    dims.sort_by(|a, b| b.total_cmp(a));
    dims
}

fn round_up_tenth(value: f64) -> f64 {
    (value * 10.0).ceil() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_fitting_box() {
        // 10x8x2 clears medium (12x10x6) but not small (8x6x4)
        let selection = select_box(10.0, 8.0, 2.0, 5.0, 139.0);
        assert_eq!(selection.box_spec.name, "medium");
        assert!(!selection.is_custom);
        assert!(!selection.requires_additional_handling);
        assert_eq!(selection.billable_weight_lbs, 5.0);
    }

    #[test]
    fn orientation_does_not_matter() {
        let a = select_box(2.0, 10.0, 8.0, 5.0, 139.0);
        let b = select_box(8.0, 2.0, 10.0, 5.0, 139.0);
        assert_eq!(a.box_spec.name, b.box_spec.name);
    }

    #[test]
    fn cube_overflows_to_custom_with_dim_weight() {
        // 20x20x20 at 5lbs: dim weight 8000/139 = 57.55.., billed 57.6
        let selection = select_box(20.0, 20.0, 20.0, 5.0, 139.0);
        assert!(selection.is_custom);
        assert_eq!(selection.box_spec.name, "custom");
        assert!((selection.dim_weight_lbs - 57.5539).abs() < 1e-3);
        assert_eq!(selection.billable_weight_lbs, 57.6);
        assert_eq!(selection.actual_weight_lbs, 5.0);
        // Heavy bill, light parcel: no handling surcharge
        assert!(!selection.requires_additional_handling);
    }

    #[test]
    fn exact_fit_counts_as_fitting() {
        let selection = select_box(8.0, 6.0, 4.0, 20.0, 139.0);
        assert_eq!(selection.box_spec.name, "small");
    }

    #[test]
    fn heavy_item_skips_boxes_below_its_weight_rating() {
        // Fits small dimensionally but exceeds its 20lb rating
        let selection = select_box(8.0, 6.0, 4.0, 25.0, 139.0);
        assert_eq!(selection.box_spec.name, "medium");
    }

    #[test]
    fn additional_handling_triggers() {
        assert!(select_box(49.0, 10.0, 10.0, 5.0, 139.0).requires_additional_handling);
        assert!(select_box(40.0, 31.0, 5.0, 5.0, 139.0).requires_additional_handling);
        assert!(select_box(10.0, 8.0, 2.0, 51.0, 139.0).requires_additional_handling);
    }

    #[test]
    fn parcel_violations_are_reported_together() {
        assert!(validate_parcel(10.0, 8.0, 2.0, 5.0).is_empty());

        let violations = validate_parcel(109.0, 30.0, 20.0, 151.0);
        assert_eq!(violations.len(), 3);
        assert!(violations[0].contains("108"));
        assert!(violations[1].contains("165"));
        assert!(violations[2].contains("150"));

        // 100 + 2*(20+15) = 170: girth violation alone
        let violations = validate_parcel(100.0, 20.0, 15.0, 10.0);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("length plus girth"));
    }

    #[test]
    fn grams_convert_to_pounds() {
        assert_eq!(grams_to_lbs(453), 453.0 / GRAMS_PER_LB);
        assert!((grams_to_lbs(2268) - 5.0).abs() < 1e-3);
        assert_eq!(grams_to_lbs(0), 0.0);
    }

    #[test]
    fn billable_weight_rounds_up_to_tenths() {
        assert_eq!(round_up_tenth(5.01), 5.1);
        assert_eq!(round_up_tenth(5.0), 5.0);
        assert_eq!(round_up_tenth(57.5539), 57.6);
    }
}
