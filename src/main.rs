fn main() {
    compilisp_harness::cli::run();
}
