//! Mock agent binary for integration testing
//!
//! Behaves like a chain agent from the supervisor's point of view: prints
//! some startup noise, announces its listener after a delay and shuts down
//! on SIGTERM. With `--serve` it also serves a small in-memory chain over
//! gRPC on an ephemeral port and advertises that port in its readiness line.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "mock_agent")]
struct Args {
    /// Delay before the readiness line
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Readiness line (ignored with --serve, which advertises the bound port)
    #[arg(long, default_value = "API listening at 127.0.0.1:50051")]
    marker: String,

    /// Print the readiness line on stderr instead of stdout
    #[arg(long)]
    stderr: bool,

    /// Never print the readiness line
    #[arg(long)]
    silent: bool,

    /// Exit with this code after the delay instead of becoming ready
    #[arg(long)]
    fail_with: Option<i32>,

    /// Exit on its own this long after becoming ready
    #[arg(long)]
    exit_after_ms: Option<u64>,

    /// Exit code used on SIGTERM and for `--exit-after-ms`
    #[arg(long, default_value_t = 0)]
    exit_code: i32,

    /// Keep running when SIGTERM arrives
    #[arg(long)]
    ignore_sigterm: bool,

    /// Number of log lines printed before the readiness line
    #[arg(long, default_value_t = 3)]
    noise: usize,

    /// Serve the chain, block, currency and construct services
    #[arg(long)]
    serve: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Install the handler before announcing readiness so an early stop is
    // never lost.
    #[cfg(unix)]
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            eprintln!("mock_agent: cannot install SIGTERM handler: {}", e);
            std::process::exit(70);
        }
    };

    for i in 0..args.noise {
        println!("level=DEBUG msg=\"booting\" step={}", i);
        eprintln!("level=DEBUG msg=\"loading config\" step={}", i);
    }

    tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;

    if let Some(code) = args.fail_with {
        eprintln!("level=ERROR msg=\"startup failed\" code={}", code);
        std::process::exit(code);
    }

    let marker = if args.serve {
        match api::serve("127.0.0.1:0").await {
            Ok(addr) => format!("API listening at {}", addr),
            Err(e) => {
                eprintln!("level=ERROR msg=\"cannot bind listener\" error=\"{}\"", e);
                std::process::exit(71);
            }
        }
    } else {
        args.marker.clone()
    };

    if !args.silent {
        if args.stderr {
            eprintln!("{}", marker);
        } else {
            println!("{}", marker);
        }
    }

    let exit_after = async {
        match args.exit_after_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(exit_after);

    loop {
        #[cfg(unix)]
        let terminated = sigterm.recv();
        #[cfg(not(unix))]
        let terminated = async { tokio::signal::ctrl_c().await.ok() };

        tokio::select! {
            _ = terminated => {
                if args.ignore_sigterm {
                    println!("level=WARN msg=\"ignoring termination request\"");
                    continue;
                }
                println!("level=INFO msg=\"shutting down\"");
                std::process::exit(args.exit_code);
            }
            _ = &mut exit_after => {
                eprintln!("level=ERROR msg=\"crashed\"");
                std::process::exit(args.exit_code);
            }
        }
    }
}

/// gRPC surface of the mock agent
///
/// Services are routed by hand so the mock needs no generated code. The
/// chain is `ETH:SEPOLIA` (plus `ETH:MAINNET` for listing) with blocks
/// `0..=HEAD`; ranges reaching past the head fail mid-stream.
mod api {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::task::{Context, Poll};

    use futures_util::stream::{self, BoxStream, StreamExt};
    use tokio::net::TcpListener;
    use tonic::body::BoxBody;
    use tonic::codec::ProstCodec;
    use tonic::codegen::{http, Body, BoxFuture, Service, StdError};
    use tonic::server::{Grpc, NamedService, ServerStreamingService, UnaryService};
    use tonic::transport::Server;
    use tonic::{Request, Response, Status};

    use ubt_harness::rpc::proto::{
        Block, BlockHeader, BlockRequest, Chain, ChainId, CreateTransferRequest, Currency,
        FinalityStatus, GetCurrencyRequest, ListBlocksRequest, ListChainsRequest, TransactionIntent,
        Uint256,
    };

    const HEAD: u64 = 3;
    const NETWORK: &str = "SEPOLIA";

    /// Bind `addr`, serve in the background and return the bound address
    pub async fn serve(addr: &str) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;

        let incoming = stream::unfold(listener, |listener| async move {
            let conn = listener.accept().await.map(|(socket, _)| socket);
            Some((conn, listener))
        });

        tokio::spawn(async move {
            let result = Server::builder()
                .add_service(ChainApi)
                .add_service(BlockApi)
                .add_service(CurrencyApi)
                .add_service(ConstructApi)
                .serve_with_incoming(Box::pin(incoming))
                .await;
            if let Err(e) = result {
                eprintln!("level=ERROR msg=\"server failed\" error=\"{}\"", e);
            }
        });

        Ok(local)
    }

    macro_rules! routed_service {
        ($ty:ident, $name:literal) => {
            #[derive(Clone)]
            struct $ty;

            impl NamedService for $ty {
                const NAME: &'static str = $name;
            }

            impl<B> Service<http::Request<B>> for $ty
            where
                B: Body + Send + 'static,
                B::Error: Into<StdError> + Send + 'static,
            {
                type Response = http::Response<BoxBody>;
                type Error = Infallible;
                type Future = BoxFuture<Self::Response, Self::Error>;

                fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                    Poll::Ready(Ok(()))
                }

                fn call(&mut self, req: http::Request<B>) -> Self::Future {
                    Box::pin(async move { Ok(route(req).await) })
                }
            }
        };
    }

    routed_service!(ChainApi, "ubt.services.UbtChainService");
    routed_service!(BlockApi, "ubt.services.UbtBlockService");
    routed_service!(CurrencyApi, "ubt.services.UbtCurrencyService");
    routed_service!(ConstructApi, "ubt.services.UbtConstructService");

    async fn route<B>(req: http::Request<B>) -> http::Response<BoxBody>
    where
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        let path = req.uri().path().to_string();
        match path.as_str() {
            "/ubt.services.UbtChainService/ListChains" => streaming(list_chains, req).await,
            "/ubt.services.UbtChainService/GetChain" => unary(get_chain, req).await,
            "/ubt.services.UbtBlockService/ListBlocks" => streaming(list_blocks, req).await,
            "/ubt.services.UbtBlockService/GetBlock" => unary(get_block, req).await,
            "/ubt.services.UbtCurrencyService/GetCurrency" => unary(get_currency, req).await,
            "/ubt.services.UbtConstructService/CreateTransfer" => unary(create_transfer, req).await,
            other => Status::unimplemented(format!("{} is not served", other)).to_http(),
        }
    }

    struct Unary<F>(F);

    impl<Req, Resp, F> UnaryService<Req> for Unary<F>
    where
        F: FnMut(Req) -> Result<Resp, Status>,
    {
        type Response = Resp;
        type Future = std::future::Ready<Result<Response<Resp>, Status>>;

        fn call(&mut self, request: Request<Req>) -> Self::Future {
            std::future::ready((self.0)(request.into_inner()).map(Response::new))
        }
    }

    struct Streaming<F>(F);

    impl<Req, Resp, F> ServerStreamingService<Req> for Streaming<F>
    where
        F: FnMut(Req) -> Result<Vec<Result<Resp, Status>>, Status>,
        Resp: Send + 'static,
    {
        type Response = Resp;
        type ResponseStream = BoxStream<'static, Result<Resp, Status>>;
        type Future = std::future::Ready<Result<Response<Self::ResponseStream>, Status>>;

        fn call(&mut self, request: Request<Req>) -> Self::Future {
            let items = (self.0)(request.into_inner());
            std::future::ready(items.map(|items| Response::new(stream::iter(items).boxed())))
        }
    }

    async fn unary<Req, Resp, B>(
        handler: fn(Req) -> Result<Resp, Status>,
        req: http::Request<B>,
    ) -> http::Response<BoxBody>
    where
        Req: prost::Message + Default + Send + 'static,
        Resp: prost::Message + Send + 'static,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        let mut grpc = Grpc::new(ProstCodec::<Resp, Req>::default());
        grpc.unary(Unary(handler), req).await
    }

    async fn streaming<Req, Resp, B>(
        handler: fn(Req) -> Result<Vec<Result<Resp, Status>>, Status>,
        req: http::Request<B>,
    ) -> http::Response<BoxBody>
    where
        Req: prost::Message + Default + Send + 'static,
        Resp: prost::Message + Send + 'static,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        let mut grpc = Grpc::new(ProstCodec::<Resp, Req>::default());
        grpc.server_streaming(Streaming(handler), req).await
    }

    // === Handlers ===

    fn chains() -> Vec<Chain> {
        ["SEPOLIA", "MAINNET"]
            .into_iter()
            .map(|network| Chain {
                id: Some(ChainId::new("ETH", network)),
                bip44_id: Some(60),
                testnet: network != "MAINNET",
                finalized_height: HEAD,
                ms_per_block: 12_000,
                supported_services: Vec::new(),
            })
            .collect()
    }

    fn require_chain(id: Option<&ChainId>) -> Result<(), Status> {
        match id {
            Some(id) if id.r#type == "ETH" && id.network == NETWORK => Ok(()),
            Some(id) => Err(Status::invalid_argument(format!("chain not supported: {}", id))),
            None => Err(Status::invalid_argument("chain id is required")),
        }
    }

    fn block(number: u64) -> Block {
        Block {
            header: Some(BlockHeader {
                id: number.to_be_bytes().to_vec(),
                number,
                parent_id: number.saturating_sub(1).to_be_bytes().to_vec(),
                timestamp: None,
                finality_status: FinalityStatus::Finalized as i32,
            }),
            transactions: Vec::new(),
        }
    }

    fn list_chains(req: ListChainsRequest) -> Result<Vec<Result<Chain, Status>>, Status> {
        Ok(chains()
            .into_iter()
            .filter(|chain| match (&req.r#type, &chain.id) {
                (Some(wanted), Some(id)) => &id.r#type == wanted,
                _ => true,
            })
            .map(Ok)
            .collect())
    }

    fn get_chain(id: ChainId) -> Result<Chain, Status> {
        chains()
            .into_iter()
            .find(|chain| chain.id.as_ref() == Some(&id))
            .ok_or_else(|| Status::invalid_argument(format!("chain not supported: {}", id)))
    }

    fn list_blocks(req: ListBlocksRequest) -> Result<Vec<Result<Block, Status>>, Status> {
        require_chain(req.chain_id.as_ref())?;
        let count = req.count.filter(|c| *c > 0).unwrap_or(1);

        let mut items = Vec::new();
        for number in req.start_number..req.start_number.saturating_add(count) {
            if number > HEAD {
                items.push(Err(Status::out_of_range(format!(
                    "block {} is beyond chain head {}",
                    number, HEAD
                ))));
                break;
            }
            items.push(Ok(block(number)));
        }
        Ok(items)
    }

    fn get_block(req: BlockRequest) -> Result<Block, Status> {
        require_chain(req.chain_id.as_ref())?;
        match req.number {
            Some(number) if number <= HEAD => Ok(block(number)),
            Some(number) => Err(Status::not_found(format!("block {} not found", number))),
            None => Err(Status::invalid_argument("lookup by id is not supported")),
        }
    }

    fn get_currency(req: GetCurrencyRequest) -> Result<Currency, Status> {
        require_chain(req.chain_id.as_ref())?;
        if req.id.is_empty() || req.id == "ETH" {
            Ok(Currency {
                id: "ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            })
        } else {
            Err(Status::not_found(format!("currency {} not found", req.id)))
        }
    }

    fn create_transfer(req: CreateTransferRequest) -> Result<TransactionIntent, Status> {
        require_chain(req.chain_id.as_ref())?;
        if req.from.is_empty() || req.to.is_empty() {
            return Err(Status::invalid_argument("sender and recipient are required"));
        }
        let value = req
            .amount
            .as_ref()
            .and_then(|amount| amount.value.as_ref())
            .and_then(Uint256::to_u128)
            .ok_or_else(|| Status::invalid_argument("amount is required"))?;

        let mut payload = format!("{}->{}:{}", req.from, req.to, value).into_bytes();
        payload.resize(32, 0);
        Ok(TransactionIntent {
            id: vec![0xab; 32],
            payload_to_sign: payload.clone(),
            signature_type: "secp256k1".to_string(),
            raw_data: payload,
            estimated_fee: Some(Uint256::from_u128(21_000)),
        })
    }
}
