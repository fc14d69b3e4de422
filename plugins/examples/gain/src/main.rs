use gain::Gain;

fn main() {
    let success = hostbridge::wrapper::standalone::hb_export_standalone::<Gain>();
    std::process::exit(if success { 0 } else { 1 });
}
