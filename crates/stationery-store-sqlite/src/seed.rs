use rand::Rng;
use stationery_core::ProductInput;

/// Stock assigned to every seeded product.
pub const SEED_STOCK: i64 = 20_000;

const FIXED_CATALOG: &[(&str, &str, i64)] = &[
    ("Trimax Pen", "Pen", 10),
    ("Reynolds Pen", "Pen", 20),
    ("Cello Gripper", "Pen", 15),
    ("Parker Pen", "Pen", 250),
    ("Pilot V7", "Pen", 120),
    ("Classmate Notebook 200 Pages", "Notebook", 120),
    ("Classmate Notebook 400 Pages", "Notebook", 220),
    ("Navneet Notebook", "Notebook", 90),
    ("Spiral Notebook", "Notebook", 180),
    ("Drawing Notebook", "Notebook", 160),
    ("Apsara Pencil Pack", "Pencil", 60),
    ("Nataraj Pencil Pack", "Pencil", 55),
    ("Camel Sketch Pen Set", "Art", 250),
    ("Camel Water Colors", "Art", 180),
    ("Oil Pastels", "Art", 150),
    ("Color Pencils Set", "Art", 220),
    ("Crayons Pack", "Art", 100),
    ("Fevicol Glue", "Office", 45),
    ("Glue Stick", "Office", 40),
    ("Stapler Small", "Office", 120),
    ("Stapler Big", "Office", 250),
    ("Staple Pins", "Office", 35),
    ("Punching Machine", "Office", 150),
    ("Paper Clips", "Office", 30),
    ("Binder Clips", "Office", 40),
    ("Sticky Notes", "Office", 60),
    ("Post-it Notes", "Office", 100),
    ("White Board Marker", "Marker", 35),
    ("Permanent Marker", "Marker", 50),
    ("Highlighter Yellow", "Marker", 60),
    ("Highlighter Set", "Marker", 150),
    ("Geometry Box", "Exam", 200),
    ("Compass Box", "Exam", 150),
    ("Scientific Calculator", "Exam", 850),
    ("Casio Calculator", "Exam", 1200),
    ("Eraser Pack", "Eraser", 30),
    ("Doms Eraser", "Eraser", 20),
    ("Sharpener", "Sharpener", 10),
    ("Sharpener Box", "Sharpener", 40),
    ("Scale 15cm", "Scale", 10),
    ("Scale 30cm", "Scale", 20),
    ("Plastic Folder", "File", 40),
    ("Office File", "File", 80),
    ("Ring Binder File", "File", 150),
    ("Document Folder", "File", 120),
    ("Chart Paper", "Paper", 25),
    ("A4 Sheets Bundle", "Paper", 200),
    ("A3 Sheets Bundle", "Paper", 350),
    ("Notebook Cover Pack", "Accessories", 60),
    ("Book Labels", "Accessories", 30),
    ("Diary", "Diary", 180),
    ("Planner Book", "Diary", 250),
    ("Graph Book", "Notebook", 100),
    ("Record Book", "Notebook", 150),
    ("White Board", "Office", 450),
    ("Drawing Board", "Art", 350),
    ("Sketch Book A4", "Art", 180),
    ("Sketch Book A3", "Art", 250),
    ("Pen Stand", "Accessories", 90),
    ("Desk Organizer", "Accessories", 300),
    ("School Bag", "Accessories", 900),
    ("Lunch Box", "Accessories", 350),
    ("Water Bottle", "Accessories", 250),
    ("School ID Card Holder", "Accessories", 80),
    ("Tape Roll", "Office", 30),
    ("Cello Tape", "Office", 40),
    ("Scissors", "Office", 70),
    ("Cutter Knife", "Office", 60),
    ("Correction Pen", "Office", 35),
    ("Correction Tape", "Office", 80),
    ("Whitener", "Office", 25),
    ("Drawing Compass", "Exam", 120),
    ("Protractor", "Exam", 20),
    ("Set Square", "Exam", 40),
    ("Math Box", "Exam", 220),
    ("School Kit Combo", "Kit", 500),
    ("Office Kit Combo", "Kit", 800),
    ("Art Kit Combo", "Kit", 700),
];

const GENERATED_PER_KIND: u32 = 50;

/// Builds the demo catalog: the fixed stationery list followed by generated
/// `Custom Notebook N` (50..=300) and `Custom Pen N` (10..=200) entries.
#[must_use]
pub fn default_seed_catalog<R: Rng + ?Sized>(rng: &mut R) -> Vec<ProductInput> {
    let mut catalog: Vec<ProductInput> = FIXED_CATALOG
        .iter()
        .map(|(name, category, price)| seed_product(*name, *category, *price))
        .collect();

    for index in 1..=GENERATED_PER_KIND {
        catalog.push(seed_product(
            format!("Custom Notebook {index}"),
            "Notebook",
            rng.gen_range(50..=300),
        ));
        catalog.push(seed_product(
            format!("Custom Pen {index}"),
            "Pen",
            rng.gen_range(10..=200),
        ));
    }

    catalog
}

#[allow(clippy::cast_precision_loss)]
fn seed_product(name: impl Into<String>, category: &str, price: i64) -> ProductInput {
    ProductInput::new(name, category, price as f64, SEED_STOCK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seed_catalog_has_fixed_and_generated_entries() {
        let mut rng = StdRng::seed_from_u64(42);
        let catalog = default_seed_catalog(&mut rng);

        assert_eq!(catalog.len(), FIXED_CATALOG.len() + 2 * GENERATED_PER_KIND as usize);
        assert!(catalog.iter().all(|item| item.stock == SEED_STOCK));
        assert!(catalog.iter().all(|item| item.validate().is_ok()));

        for item in catalog.iter().filter(|item| item.name.starts_with("Custom Notebook")) {
            assert!((50.0..=300.0).contains(&item.price), "{item:?}");
        }
        for item in catalog.iter().filter(|item| item.name.starts_with("Custom Pen")) {
            assert!((10.0..=200.0).contains(&item.price), "{item:?}");
        }
    }

    #[test]
    fn seed_catalog_is_deterministic_for_a_fixed_rng() {
        let first = default_seed_catalog(&mut StdRng::seed_from_u64(9));
        let second = default_seed_catalog(&mut StdRng::seed_from_u64(9));
        assert_eq!(first, second);
    }
}
