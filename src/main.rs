fn main() {
    cdss_lib::run()
}
