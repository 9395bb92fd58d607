//! Plant growth driven by affection

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlantStage {
    pub name: &'static str,
    pub min_affection: u64,
    pub description: &'static str,
}

pub const PLANT_STAGES: [PlantStage; 6] = [
    PlantStage {
        name: "Seed",
        min_affection: 0,
        description: "A hopeful seed, waiting for your focus to water it.",
    },
    PlantStage {
        name: "Sprout",
        min_affection: 30,
        description: "A tiny shoot breaks through the soil.",
    },
    PlantStage {
        name: "Grass",
        min_affection: 100,
        description: "Green blades stretch out in the sun.",
    },
    PlantStage {
        name: "Bush",
        min_affection: 250,
        description: "A leafy little bush, thriving on your company.",
    },
    PlantStage {
        name: "Sapling",
        min_affection: 500,
        description: "A straight young tree, full of life.",
    },
    PlantStage {
        name: "Blossom tree",
        min_affection: 1000,
        description: "A tree in full bloom.",
    },
];

/// Index of the highest stage reached
fn stage_index(affection: u64) -> usize {
    PLANT_STAGES
        .iter()
        .rposition(|stage| affection >= stage.min_affection)
        .unwrap_or(0)
}

pub fn current_stage(affection: u64) -> &'static PlantStage {
    &PLANT_STAGES[stage_index(affection)]
}

/// `None` at the final stage
pub fn next_stage(affection: u64) -> Option<&'static PlantStage> {
    PLANT_STAGES.get(stage_index(affection) + 1)
}

/// Percent of the way from the current stage to the next (100 at the end)
pub fn progress_to_next(affection: u64) -> f64 {
    let current = current_stage(affection);
    match next_stage(affection) {
        Some(next) => {
            let span = (next.min_affection - current.min_affection) as f64;
            (affection - current.min_affection) as f64 / span * 100.0
        }
        None => 100.0,
    }
}
