use vergen_gix::{BuildBuilder, Emitter, GixBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let gix = GixBuilder::default().sha(true).build()?;

    // Source tarballs have no git metadata; fall back silently.
    Emitter::default()
        .quiet()
        .add_instructions(&build)?
        .add_instructions(&gix)?
        .emit()?;

    Ok(())
}
