fn main() {
    phasec_driver::run();
}
