use gateway_core::GatewayConfig;

fn main() {
    let config = serdeconv::to_toml_string(&GatewayConfig::default()).expect("Failed to generate config file");

    println!("{}", config);
}
