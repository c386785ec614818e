//cargo run --package mask_engine --bin main -- [output.geojson]
use mask_engine::{
    EditCommand, EditionEngine, GeoDouglasPeucker, MaskEvent, MaskStore, Mode, RadialDouglasPeucker, Simplifier,
};
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

const SESSION: &str = r#"[
    {"type": "set_target_class", "params": {"class_id": 2}},
    {"type": "set_mode", "params": {"mode": "create"}},
    {"type": "pointer_down", "params": {"x": 0.10, "y": 0.10}},
    {"type": "pointer_down", "params": {"x": 0.45, "y": 0.10}},
    {"type": "pointer_down", "params": {"x": 0.45, "y": 0.45}},
    {"type": "pointer_down", "params": {"x": 0.10, "y": 0.45}},
    {"type": "commit"},
    {"type": "pointer_down", "params": {"x": 0.55, "y": 0.55}},
    {"type": "pointer_down", "params": {"x": 0.90, "y": 0.60}},
    {"type": "pointer_move", "params": {"x": 0.70, "y": 0.95}},
    {"type": "pointer_down", "params": {"x": 0.70, "y": 0.95}},
    {"type": "commit"},
    {"type": "set_mode", "params": {"mode": "select"}},
    {"type": "pointer_down", "params": {"x": 0.20, "y": 0.20}},
    {"type": "set_mode", "params": {"mode": "edit-remove"}},
    {"type": "pointer_down", "params": {"x": 0.20, "y": 0.20}},
    {"type": "pointer_down", "params": {"x": 0.30, "y": 0.20}},
    {"type": "pointer_down", "params": {"x": 0.30, "y": 0.30}},
    {"type": "pointer_down", "params": {"x": 0.20, "y": 0.30}},
    {"type": "commit"},
    {"type": "filter_all", "params": {"min_pixels": 20}}
]"#;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish()
        .init();

    println!("🎯 Mask Engine Demo");
    println!("===================");

    demo_commands()?;
    let engine = demo_session()?;
    demo_simplification(&engine);
    demo_export(engine.store(), std::env::args().nth(1))?;

    println!("✅ Demo completed successfully!");
    Ok(())
}

fn demo_commands() -> color_eyre::Result<()> {
    println!("\n🔧 Available edit commands");
    println!("--------------------------");
    for (i, name) in EditCommand::command_names().iter().enumerate() {
        println!("   {}. {}", i + 1, name);
    }
    let example = EditCommand::PointerDown { x: 0.25, y: 0.5 };
    println!("\n   🔹 {}: {}", example, example.description());
    println!("   JSON: {}", serde_json::to_string(&example)?);
    tracing::debug!(schema = %serde_json::to_string(&EditCommand::schema())?, "command schema");
    Ok(())
}

fn demo_session() -> color_eyre::Result<EditionEngine> {
    println!("\n🖌️  Scripted annotation session");
    println!("-------------------------------");
    let mut engine = EditionEngine::builder()
        .with_size(128, 96)
        .with_initial_mode(Mode::Select)
        .build();
    engine.subscribe(|event| match event {
        MaskEvent::Update => tracing::info!("mask updated"),
        MaskEvent::Selection { id } => tracing::info!(?id, "selection changed"),
    });

    let commands: Vec<EditCommand> = serde_json::from_str(SESSION)?;
    for command in commands {
        engine.execute(command)?;
    }

    for &fused in engine.store().fused_ids() {
        let id = mask_engine::codec::unfuse(fused);
        let blobs = engine.store().get_blobs(id, None);
        let holes: usize = blobs.values().map(|b| b.holes().count()).sum();
        println!(
            "   📊 {}: {} pixels, {} blob(s), {} hole(s)",
            mask_engine::codec::instance_key(id),
            engine.store().pixel_count(id),
            blobs.len(),
            holes
        );
    }
    Ok(engine)
}

fn demo_simplification(engine: &EditionEngine) {
    println!("\n🔬 Outline simplification");
    println!("-------------------------");
    let Some(selected) = engine.selected() else {
        println!("   nothing selected");
        return;
    };
    let simplifiers: [(&str, Box<dyn Simplifier>); 2] = [
        ("radial + Douglas-Peucker", Box::new(RadialDouglasPeucker::default())),
        ("geo Douglas-Peucker", Box::new(GeoDouglasPeucker)),
    ];
    for polygon in engine.selection_polygons() {
        for (name, simplifier) in &simplifiers {
            for tolerance in [1.0, 2.0, 4.0] {
                let simplified = simplifier.simplify(&polygon.data, tolerance);
                println!(
                    "   🔹 {} {} contour, {} (ε={}): {} → {} points",
                    mask_engine::codec::instance_key(selected),
                    polygon.kind,
                    name,
                    tolerance,
                    polygon.data.len(),
                    simplified.len()
                );
            }
        }
    }
}

fn demo_export(store: &MaskStore, output: Option<String>) -> color_eyre::Result<()> {
    println!("\n📦 Export");
    println!("---------");
    let url = store.to_base64()?;
    println!("   PNG data URL: {} bytes", url.len());
    let geojson = store.to_geojson_string()?;
    match output {
        Some(path) => {
            std::fs::write(&path, geojson)?;
            println!("   📁 GeoJSON written to {path}");
        }
        None => println!("   GeoJSON: {} features", store.fused_ids().len()),
    }
    Ok(())
}
