//! `careplan stats`: Dataset statistics.

use std::collections::BTreeMap;

use careplan_config::AppConfig;
use careplan_pipeline::load_dataset;

pub async fn run(config: AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load_dataset(&config)?;
    let stats = dataset.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  📊 Dataset: {}", dataset.source());
    println!("  ========================================");
    println!("  Records:          {}", stats.total_records);
    println!("  Average BMI:      {:.2}", stats.average_bmi);
    println!("  Average age:      {:.1}", stats.average_age);
    println!("  Average weight:   {:.1} kg", stats.average_weight_kg);
    println!("  Average height:   {:.1} cm", stats.average_height_cm);

    print_distribution("BMI categories", &stats.bmi_categories, stats.total_records);
    print_distribution("Residence", &stats.residence_types, stats.total_records);
    print_distribution("Wealth index", &stats.wealth_tiers, stats.total_records);
    print_distribution("States", &stats.states, stats.total_records);
    println!();

    Ok(())
}

fn print_distribution(title: &str, counts: &BTreeMap<String, usize>, total: usize) {
    println!();
    println!("  {title}:");
    let mut rows: Vec<(&String, &usize)> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (label, count) in rows {
        let pct = if total == 0 { 0.0 } else { *count as f64 * 100.0 / total as f64 };
        println!("    {label:<24} {count:>6}  ({pct:>5.1}%)");
    }
}
