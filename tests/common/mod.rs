//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 集成测试公共设施：脚本化存储层与记录式响应器

#![allow(dead_code)]

use async_trait::async_trait;
use memstrata::common::{
    DeleteRequest, GatRequest, GetEResponse, GetRequest, GetResponse, RequestKind, SetRequest,
    TouchRequest,
};
use memstrata::error::{CacheError, Result};
use memstrata::handlers::{GetEStream, GetStream, TierHandler};
use memstrata::protocol::Responder;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// 脚本化存储层
///
/// 每个动词按队列顺序弹出预设结果，队列耗尽时回退到默认行为
/// （写入成功、读取全未命中）。所有收到的请求都会被记录，供断言
/// 回填、副本等副作用。
#[derive(Default)]
pub struct ScriptedHandler {
    set_results: Mutex<VecDeque<Result<()>>>,
    replace_results: Mutex<VecDeque<Result<()>>>,
    delete_results: Mutex<VecDeque<Result<()>>>,
    get_batches: Mutex<VecDeque<Vec<Result<GetResponse>>>>,
    get_e_batches: Mutex<VecDeque<Vec<Result<GetEResponse>>>>,
    pub sets: Mutex<Vec<SetRequest>>,
    pub replaces: Mutex<Vec<SetRequest>>,
    pub deletes: Mutex<Vec<DeleteRequest>>,
    pub gets: Mutex<Vec<GetRequest>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_set(&self, result: Result<()>) {
        self.set_results.lock().unwrap().push_back(result);
    }

    pub fn queue_replace(&self, result: Result<()>) {
        self.replace_results.lock().unwrap().push_back(result);
    }

    pub fn queue_delete(&self, result: Result<()>) {
        self.delete_results.lock().unwrap().push_back(result);
    }

    pub fn queue_get(&self, batch: Vec<Result<GetResponse>>) {
        self.get_batches.lock().unwrap().push_back(batch);
    }

    pub fn queue_get_e(&self, batch: Vec<Result<GetEResponse>>) {
        self.get_e_batches.lock().unwrap().push_back(batch);
    }

    pub fn recorded_sets(&self) -> Vec<SetRequest> {
        self.sets.lock().unwrap().clone()
    }

    fn pop(queue: &Mutex<VecDeque<Result<()>>>) -> Result<()> {
        queue.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl TierHandler for ScriptedHandler {
    async fn set(&self, req: SetRequest) -> Result<()> {
        self.sets.lock().unwrap().push(req);
        Self::pop(&self.set_results)
    }

    async fn add(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn replace(&self, req: SetRequest) -> Result<()> {
        self.replaces.lock().unwrap().push(req);
        Self::pop(&self.replace_results)
    }

    async fn append(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn prepend(&self, _req: SetRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn get(&self, req: GetRequest) -> GetStream {
        let scripted = self.get_batches.lock().unwrap().pop_front();
        let items = match scripted {
            Some(batch) => batch,
            None => req
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    Ok(GetResponse {
                        miss: true,
                        key: key.clone(),
                        data: Vec::new(),
                        flags: 0,
                        opaque: req.opaques.get(i).copied().unwrap_or(0),
                        quiet: req.quiet.get(i).copied().unwrap_or(false),
                    })
                })
                .collect(),
        };
        self.gets.lock().unwrap().push(req);
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            let _ = tx.send(item).await;
        }
        rx
    }

    async fn get_e(&self, req: GetRequest) -> GetEStream {
        let scripted = self.get_e_batches.lock().unwrap().pop_front();
        let items = match scripted {
            Some(batch) => batch,
            None => req
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    Ok(GetEResponse {
                        miss: true,
                        key: key.clone(),
                        data: Vec::new(),
                        flags: 0,
                        exptime: 0,
                        opaque: req.opaques.get(i).copied().unwrap_or(0),
                        quiet: req.quiet.get(i).copied().unwrap_or(false),
                    })
                })
                .collect(),
        };
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            let _ = tx.send(item).await;
        }
        rx
    }

    async fn gat(&self, _req: GatRequest) -> Result<GetResponse> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        self.deletes.lock().unwrap().push(req);
        Self::pop(&self.delete_results)
    }

    async fn touch(&self, _req: TouchRequest) -> Result<()> {
        Err(CacheError::UnsupportedCommand)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// 响应器写出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum Out {
    Set { opaque: u32, quiet: bool },
    Add { opaque: u32, quiet: bool },
    Replace { opaque: u32, quiet: bool },
    Append { opaque: u32, quiet: bool },
    Prepend { opaque: u32, quiet: bool },
    Delete { opaque: u32, quiet: bool },
    Touch { opaque: u32, quiet: bool },
    Get(GetResponse),
    GetE(GetEResponse),
    Gat(GetResponse),
    GetEnd { opaque: u32, noop_end: bool },
    Noop(u32),
    Quit(u32),
    Version(u32),
    Error { opaque: u32, kind: RequestKind },
}

/// 记录式响应器，按调用顺序累积事件
#[derive(Default)]
pub struct RecordingResponder {
    outs: Mutex<Vec<Out>>,
    fail_writes: AtomicBool,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outs(&self) -> Vec<Out> {
        self.outs.lock().unwrap().clone()
    }

    /// 之后的所有写出都失败，模拟客户端连接中断
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn push(&self, out: Out) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Internal("connection closed".to_string()));
        }
        self.outs.lock().unwrap().push(out);
        Ok(())
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn set(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Set { opaque, quiet })
    }

    async fn add(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Add { opaque, quiet })
    }

    async fn replace(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Replace { opaque, quiet })
    }

    async fn append(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Append { opaque, quiet })
    }

    async fn prepend(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Prepend { opaque, quiet })
    }

    async fn delete(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Delete { opaque, quiet })
    }

    async fn touch(&self, opaque: u32, quiet: bool) -> Result<()> {
        self.push(Out::Touch { opaque, quiet })
    }

    async fn get(&self, response: GetResponse) -> Result<()> {
        self.push(Out::Get(response))
    }

    async fn get_e(&self, response: GetEResponse) -> Result<()> {
        self.push(Out::GetE(response))
    }

    async fn gat(&self, response: GetResponse) -> Result<()> {
        self.push(Out::Gat(response))
    }

    async fn get_end(&self, opaque: u32, noop_end: bool) -> Result<()> {
        self.push(Out::GetEnd { opaque, noop_end })
    }

    async fn noop(&self, opaque: u32) -> Result<()> {
        self.push(Out::Noop(opaque))
    }

    async fn quit(&self, opaque: u32, quiet: bool) -> Result<()> {
        let _ = quiet;
        self.push(Out::Quit(opaque))
    }

    async fn version(&self, opaque: u32) -> Result<()> {
        self.push(Out::Version(opaque))
    }

    async fn error(
        &self,
        opaque: u32,
        kind: RequestKind,
        _err: &CacheError,
        _quiet: bool,
    ) -> Result<()> {
        self.push(Out::Error { opaque, kind })
    }
}

/// 构造单键读取请求
pub fn get_req(keys: &[&[u8]]) -> GetRequest {
    GetRequest {
        keys: keys.iter().map(|k| k.to_vec()).collect(),
        opaques: keys.iter().enumerate().map(|(i, _)| i as u32).collect(),
        quiet: vec![false; keys.len()],
        noop_opaque: 0,
        noop_end: false,
    }
}

pub fn set_req(key: &[u8], data: &[u8]) -> SetRequest {
    SetRequest {
        key: key.to_vec(),
        data: data.to_vec(),
        flags: 0,
        exptime: 0,
        opaque: 0,
        quiet: false,
    }
}

pub fn hit(key: &[u8], data: &[u8], opaque: u32) -> Result<GetResponse> {
    Ok(GetResponse {
        miss: false,
        key: key.to_vec(),
        data: data.to_vec(),
        flags: 0,
        opaque,
        quiet: false,
    })
}

pub fn miss(key: &[u8], opaque: u32) -> Result<GetResponse> {
    Ok(GetResponse {
        miss: true,
        key: key.to_vec(),
        data: Vec::new(),
        flags: 0,
        opaque,
        quiet: false,
    })
}

pub fn hit_e(key: &[u8], data: &[u8], exptime: u32, opaque: u32) -> Result<GetEResponse> {
    Ok(GetEResponse {
        miss: false,
        key: key.to_vec(),
        data: data.to_vec(),
        flags: 0,
        exptime,
        opaque,
        quiet: false,
    })
}

pub fn miss_e(key: &[u8], opaque: u32) -> Result<GetEResponse> {
    Ok(GetEResponse {
        miss: true,
        key: key.to_vec(),
        data: Vec::new(),
        flags: 0,
        exptime: 0,
        opaque,
        quiet: false,
    })
}
