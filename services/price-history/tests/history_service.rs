//! End-to-end checks of the source registry against mocked upstreams

use price_history::sources::local_csv;
use price_history::{
    calculate_twap, calculate_twap_interday, calculate_twap_ohlc, CovalentClient, DateWindow,
    DexSubgraph, GateIoClient, KrakenClient, LocalCsvSource, PriceHistoryError,
    PriceHistoryService, PriceRecord, SourceKind, SubgraphClient, TwapMethod,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MAR_1: i64 = 1_646_092_800;
const MAR_2: i64 = 1_646_179_200;

async fn gate_io_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spot/candlesticks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            ["1646092800", "500", "20", "20", "10", "10"],
            ["1646179200", "700", "30", "40", "20", "30"]
        ])))
        .mount(&server)
        .await;
    server
}

#[test]
fn twap_reference_values() {
    assert_eq!(calculate_twap(&[10.0, 20.0, 30.0], 3).unwrap(), 20.0);
    assert_eq!(calculate_twap(&[10.0, 20.0], 4).unwrap(), 7.5);

    let candle = PriceRecord {
        timestamp: MAR_1,
        open: Some(10.0),
        high: Some(20.0),
        low: Some(10.0),
        close: 20.0,
        volume: None,
    };
    assert_eq!(calculate_twap_ohlc(&[candle], 1).unwrap(), 15.0);

    let closes = [
        PriceRecord::close_only(MAR_1, 100.0),
        PriceRecord::close_only(MAR_2, 200.0),
    ];
    assert_eq!(calculate_twap_interday(&closes, 2).unwrap(), 150.0);
}

fn assert_same_bytes(first: &[PriceRecord], second: &[PriceRecord]) {
    assert!(!first.is_empty());
    assert_eq!(
        serde_json::to_vec(first).unwrap(),
        serde_json::to_vec(second).unwrap()
    );
}

#[tokio::test]
async fn repeated_gate_io_calls_give_identical_output() {
    let server = gate_io_server().await;
    let client = GateIoClient::with_base_url(&server.uri()).unwrap();

    let first = client
        .get_historical_token_spot_prices("ETH_USDT", MAR_1, MAR_2)
        .await
        .unwrap();
    let second = client
        .get_historical_token_spot_prices("ETH_USDT", MAR_1, MAR_2)
        .await
        .unwrap();

    assert_same_bytes(&first, &second);
}

#[tokio::test]
async fn repeated_covalent_calls_give_identical_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"prices": [
                {"date": "2022-03-02", "price": 2950.5},
                {"date": "2022-03-01", "price": 2920.25}
            ]}]
        })))
        .mount(&server)
        .await;

    let client = CovalentClient::with_base_url("test", &server.uri()).unwrap();
    let usdc = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    let first = client.get_historical_token_spot_prices(usdc, MAR_1, MAR_2).await.unwrap();
    let second = client.get_historical_token_spot_prices(usdc, MAR_1, MAR_2).await.unwrap();

    assert_same_bytes(&first, &second);
}

#[tokio::test]
async fn repeated_kraken_calls_give_identical_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/OHLC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": [],
            "result": {
                "XETHZUSD": [
                    [1_646_092_800, "10", "20", "10", "20", "15.5", "3.0", 12],
                    [1_646_179_200, "20", "40", "20", "30", "28.0", "5.0", 20]
                ],
                "last": 1_646_179_200
            }
        })))
        .mount(&server)
        .await;

    let client = KrakenClient::with_base_url(&server.uri()).unwrap();

    let first = client.get_historical_ohlc_token_spot_prices("XETHZUSD", MAR_1).await.unwrap();
    let second = client.get_historical_ohlc_token_spot_prices("XETHZUSD", MAR_1).await.unwrap();

    assert_same_bytes(&first, &second);
}

#[tokio::test]
async fn repeated_subgraph_calls_give_identical_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"tokenDayDatas": [
                {"id": "0x1f98-19052", "priceUSD": "9.8721", "date": 1_646_092_800},
                {"id": "0x1f98-19053", "priceUSD": "10.0345", "date": 1_646_179_200}
            ]}
        })))
        .mount(&server)
        .await;

    for dex in [DexSubgraph::Uniswap, DexSubgraph::Sushiswap] {
        let client = SubgraphClient::with_gateway(dex, "test-key", &server.uri()).unwrap();
        let token = "0x1f9840a85d5af5bf1d1762f925bdaddc4201f984";

        let first = client.get_historical_token_spot_prices(token, MAR_1, MAR_2).await.unwrap();
        let second = client.get_historical_token_spot_prices(token, MAR_1, MAR_2).await.unwrap();

        assert_same_bytes(&first, &second);
    }
}

#[test]
fn repeated_local_reads_give_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("eth.csv");
    std::fs::write(&file, "1646179200,30.0,2.0\n1646092800,10.0,1.0\n").unwrap();

    let first = local_csv::get_historical_token_spot_prices(&file, MAR_1, MAR_2).unwrap();
    let second = local_csv::get_historical_token_spot_prices(&file, MAR_1, MAR_2).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first.into_rows()).unwrap(),
        serde_json::to_vec(&second.into_rows()).unwrap()
    );
}

#[tokio::test]
async fn service_routes_and_computes_twap() {
    let server = gate_io_server().await;

    let mut service = PriceHistoryService::new();
    service.add_source(
        SourceKind::GateIo,
        Arc::new(GateIoClient::with_base_url(&server.uri()).unwrap()),
    );

    let window = DateWindow::new(MAR_1, MAR_2).unwrap();

    // (10+20+10+20)/4 = 15, (30+40+20+30)/4 = 30
    let ohlc = service
        .get_twap(SourceKind::GateIo, "ETH_USDT", window, window.days(), TwapMethod::Ohlc)
        .await
        .unwrap();
    assert_eq!(ohlc.twap, 22.5);
    assert_eq!(ohlc.points, 2);

    let interday = service
        .get_twap(SourceKind::GateIo, "ETH_USDT", window, 2, TwapMethod::Interday)
        .await
        .unwrap();
    assert_eq!(interday.twap, 25.0);

    assert_eq!(service.configured_sources(), vec![SourceKind::GateIo]);
}

#[tokio::test]
async fn unconfigured_source_is_reported() {
    let service = PriceHistoryService::new();
    let window = DateWindow::new(MAR_1, MAR_2).unwrap();

    let err = service
        .get_historical_prices(SourceKind::Uniswap, "0xabc", window)
        .await
        .unwrap_err();

    assert!(matches!(err, PriceHistoryError::UnknownSource(_)));
}

#[tokio::test]
async fn kraken_and_local_sources_share_the_record_shape() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/OHLC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": [],
            "result": {
                "XETHZUSD": [[1_646_092_800, "10", "20", "10", "20", "15.5", "3.0", 12]],
                "last": 1_646_092_800
            }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("eth.csv"), "1646092800,20.0,3.0\n").unwrap();

    let mut service = PriceHistoryService::new();
    service.add_source(
        SourceKind::Kraken,
        Arc::new(KrakenClient::with_base_url(&server.uri()).unwrap()),
    );
    service.add_source(SourceKind::LocalCsv, Arc::new(LocalCsvSource::new(dir.path())));

    let window = DateWindow::new(MAR_1, MAR_1).unwrap();
    let exchange = service
        .get_historical_prices(SourceKind::Kraken, "XETHZUSD", window)
        .await
        .unwrap();
    let local = service
        .get_historical_prices(SourceKind::LocalCsv, "eth.csv", window)
        .await
        .unwrap();

    assert_eq!(exchange[0].close, local[0].close);
    assert_eq!(exchange[0].volume, local[0].volume);
    assert_eq!(calculate_twap_interday(&exchange, 1).unwrap(), 20.0);
}
