// build.rs

fn main() {
    // Generate build info
    vergen::EmitBuilder::builder()
        .build_timestamp()
        .emit()
        .expect("Unable to generate build info");
}
